use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get},
};

/// Admin Router Module
///
/// Moderation and support endpoints, nested under `/admin`. Handlers check
/// for the 'admin' role themselves and answer 403 otherwise. Protected
/// accounts stay protected here too: the erasure engine refuses them.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // DELETE /admin/users/{id}
        // Moderation erasure of another user's account.
        .route("/users/{id}", delete(handlers::admin_erase_user))
        // GET /admin/users/{id}/erasure-preview
        // Read-only impact counts for support audits.
        .route(
            "/users/{id}/erasure-preview",
            get(handlers::admin_preview_erasure),
        )
}

use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get},
};

/// Authenticated Router Module
///
/// Routes acting on the caller's own account. Every handler relies on the
/// `AuthUser` middleware layered above this module, so the id it acts on is
/// always the authenticated requester's.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // DELETE /me/account
        // Permanently erases the caller and every row referencing them, then
        // clears the session cookie.
        .route("/me/account", delete(handlers::delete_account))
        // GET /me/account/erasure-preview
        // Counts for the "are you sure?" confirmation screen.
        .route(
            "/me/account/erasure-preview",
            get(handlers::preview_my_erasure),
        )
}

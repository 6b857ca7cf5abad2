use crate::{
    AppState,
    auth::{AuthUser, SESSION_COOKIE},
    erasure::{EraseOptions, ErasureEngine, ErasureError},
    models::{ErasurePreview, ErasureSummary, ErrorResponse},
};
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

// --- Error Mapping ---

/// erasure_status
///
/// The only place erasure errors become HTTP statuses. Validation failures get
/// their own 4xx; everything transactional is a generic 500.
pub fn erasure_status(err: &ErasureError) -> StatusCode {
    match err {
        // Preflight rejections: nothing was written.
        ErasureError::NotFound { .. } => StatusCode::NOT_FOUND,
        ErasureError::ProtectedAccount { .. } => StatusCode::FORBIDDEN,
        // Every transactional class; the rollback already happened.
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn erasure_error_response(err: &ErasureError) -> Response {
    let status = erasure_status(err);
    // Store internals stay in the logs; the client only learns the class.
    let body = ErrorResponse {
        error: match status {
            StatusCode::INTERNAL_SERVER_ERROR => "erasure_failed".to_string(),
            _ => err.kind().to_string(),
        },
        retryable: err.is_retryable(),
    };
    (status, Json(body)).into_response()
}

fn internal_error() -> Response {
    let body = ErrorResponse {
        error: "erasure_failed".to_string(),
        retryable: false,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// run_erasure
///
/// Runs the erasure on its own task. If the client disconnects, this handler
/// future is dropped but the spawned task keeps going until it commits, fails
/// or times out; there is no cooperative cancellation mid-transaction.
async fn run_erasure(engine: ErasureEngine, user_id: Uuid) -> Result<ErasureSummary, Response> {
    // Step 1: Detach the erasure from the request future.
    let task =
        tokio::spawn(async move { engine.erase_user(user_id, EraseOptions::default()).await });
    // Step 2: Translate the outcome; engine errors keep their class, a
    // panicked task becomes an opaque 500.
    match task.await {
        Ok(Ok(summary)) => Ok(summary),
        Ok(Err(err)) => Err(erasure_error_response(&err)),
        Err(join_err) => {
            tracing::error!(user_id = %user_id, "erasure task aborted: {}", join_err);
            Err(internal_error())
        }
    }
}

// --- Handlers ---

/// delete_account
///
/// [Authenticated Route] Permanently erases the caller's own account.
///
/// On success the session cookie is cleared and the erasure summary returned.
/// Administrators are refused (403) and must go through the out-of-band process.
#[utoipa::path(
    delete,
    path = "/me/account",
    responses(
        (status = 200, description = "Account erased", body = ErasureSummary),
        (status = 403, description = "Protected account", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 500, description = "Erasure failed, nothing was deleted", body = ErrorResponse)
    )
)]
pub async fn delete_account(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Response {
    match run_erasure(state.erasure.clone(), id).await {
        Ok(summary) => {
            // The account is gone, so the session is dead too; expire the cookie.
            let cleared = format!("{SESSION_COOKIE}=; Max-Age=0; Path=/; HttpOnly");
            ([(header::SET_COOKIE, cleared)], Json(summary)).into_response()
        }
        // Failed erasures leave the session untouched: the account still exists.
        Err(response) => response,
    }
}

/// preview_my_erasure
///
/// [Authenticated Route] What erasing the caller's account would remove.
/// Best-effort: families that could not be counted are listed as unavailable.
#[utoipa::path(
    get,
    path = "/me/account/erasure-preview",
    responses((status = 200, description = "Preview", body = ErasurePreview))
)]
pub async fn preview_my_erasure(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Json<ErasurePreview> {
    Json(state.erasure.preview_erasure(id).await)
}

/// admin_erase_user
///
/// [Admin Route] Erases any non-protected account for moderation purposes.
///
/// *Authorization*: Explicitly checks that the `role` resolved by `AuthUser` is "admin".
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Account erased", body = ErasureSummary),
        (status = 403, description = "Caller not admin, or target protected"),
        (status = 404, description = "Account not found", body = ErrorResponse)
    )
)]
pub async fn admin_erase_user(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Response {
    // Authorization Check: only admins may erase other accounts.
    if !caller.is_admin() {
        return StatusCode::FORBIDDEN.into_response();
    }
    // Protected targets (other admins, the caller themselves) are refused by
    // the engine's preflight, not here.
    tracing::info!(admin_id = %caller.id, user_id = %user_id, "moderation erasure requested");
    match run_erasure(state.erasure.clone(), user_id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(response) => response,
    }
}

/// admin_preview_erasure
///
/// [Admin Route] Preview for support audits.
#[utoipa::path(
    get,
    path = "/admin/users/{id}/erasure-preview",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Preview", body = ErasurePreview),
        (status = 403, description = "Caller not admin")
    )
)]
pub async fn admin_preview_erasure(
    caller: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ErasurePreview>, StatusCode> {
    // Authorization Check: Admin role required.
    if !caller.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(Json(state.erasure.preview_erasure(user_id).await))
}

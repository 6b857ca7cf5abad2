use std::time::Instant;
use uuid::Uuid;

use super::{
    error::{ErasureError, FailureContext},
    store::ErasureStore,
};
use crate::models::ErasureImpact;

/// validate
///
/// Loads the user and its collection counts and decides whether the erasure
/// may proceed. Never writes.
///
/// - Missing user → `NotFound`.
/// - Administrator → `ProtectedAccount`; those go through a separate process.
/// - Inactive or banned accounts are logged, not rejected.
///
/// `started` is when the erasure began; store failures report time elapsed
/// since then.
pub async fn validate(
    store: &dyn ErasureStore,
    user_id: Uuid,
    started: Instant,
) -> Result<ErasureImpact, ErasureError> {
    let impact = store
        .load_impact(user_id)
        .await
        .map_err(|source| ErasureError::classify(source, FailureContext::since(user_id, started, None)))?
        .ok_or(ErasureError::NotFound { user_id })?;

    if impact.user.is_protected() {
        tracing::warn!(user_id = %user_id, role = %impact.user.role, "refusing to erase protected account");
        return Err(ErasureError::ProtectedAccount {
            user_id,
            role: impact.user.role,
        });
    }

    if !impact.user.is_active || impact.user.is_banned {
        tracing::warn!(
            user_id = %user_id,
            is_active = impact.user.is_active,
            is_banned = impact.user.is_banned,
            "erasing an inactive or banned account"
        );
    }

    let counts = &impact.counts;
    tracing::info!(
        user_id = %user_id,
        posts = counts.posts,
        comments = counts.comments,
        followers = counts.followers,
        following = counts.following,
        stories = counts.stories,
        conversations = counts.conversations,
        "erasure impact"
    );

    Ok(impact)
}

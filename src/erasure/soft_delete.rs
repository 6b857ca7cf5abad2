use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{error::StoreError, store::ErasureTransaction};

/// ScrambledIdentity
///
/// Placeholder values written over a user's unique fields by the safety net.
/// Derived from the erasure instant and the user id, so two accounts can
/// never collide on the unique email/username indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrambledIdentity {
    pub email: String,
    pub username: String,
    pub ban_reason: String,
    /// The instant the placeholders were derived from; also the new `updated_at`.
    pub erased_at: DateTime<Utc>,
}

pub fn scrambled_identity(user_id: Uuid, now: DateTime<Utc>) -> ScrambledIdentity {
    let stamp = now.timestamp_millis();
    let tag = user_id.simple();
    ScrambledIdentity {
        email: format!("deleted_{stamp}_{tag}@deleted.invalid"),
        username: format!("deleted_{stamp}_{tag}"),
        ban_reason: format!("account erasure started at {}", now.to_rfc3339()),
        erased_at: now,
    }
}

/// apply
///
/// Runs the safety-net soft delete: inactive, banned, scrambled identity,
/// `updated_at` stamped with the same instant as the placeholders. Fails with `RowNotFound` if the user row is missing.
pub async fn apply(
    tx: &mut dyn ErasureTransaction,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let identity = scrambled_identity(user_id, now);
    let updated = tx.soft_delete_user(user_id, &identity).await?;
    if updated == 0 {
        return Err(StoreError::RowNotFound);
    }
    tracing::debug!(user_id = %user_id, username = %identity.username, "account soft-deleted");
    Ok(())
}

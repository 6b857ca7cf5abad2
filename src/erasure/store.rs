use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

use super::{
    error::StoreError,
    schema::{EntityFamily, PreviewFamily},
    soft_delete::ScrambledIdentity,
};
use crate::models::ErasureImpact;

/// ErasureStore
///
/// The store handle injected into the erasure engine. Read operations run
/// outside any transaction; every write goes through an `ErasureTransaction`
/// obtained from `begin`.
///
/// **Send + Sync + async_trait** keep `Arc<dyn ErasureStore>` shareable across
/// request tasks, the same way the repository layer is shared.
#[async_trait]
pub trait ErasureStore: Send + Sync {
    /// Loads the user with the counts of its principal collections, or `None`
    /// if no such user exists.
    async fn load_impact(&self, user_id: Uuid) -> Result<Option<ErasureImpact>, StoreError>;

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, StoreError>;

    /// Counts one preview family for the user. Each call is independent.
    async fn count(&self, family: PreviewFamily, user_id: Uuid) -> Result<i64, StoreError>;

    /// Opens a transaction whose statements may each run for at most `timeout`.
    async fn begin(&self, timeout: Duration) -> Result<Box<dyn ErasureTransaction>, StoreError>;
}

/// ErasureTransaction
///
/// One open transaction. Nothing written through it is visible to other
/// connections until `commit`; dropping it without committing rolls back.
#[async_trait]
pub trait ErasureTransaction: Send {
    /// Takes the per-user erasure lock for the rest of the transaction and
    /// reports whether the user row still exists once the lock is held.
    async fn lock_user(&mut self, user_id: Uuid) -> Result<bool, StoreError>;

    /// Deactivates and bans the account and overwrites its unique identity
    /// fields. Returns the number of user rows updated.
    async fn soft_delete_user(
        &mut self,
        user_id: Uuid,
        identity: &ScrambledIdentity,
    ) -> Result<u64, StoreError>;

    /// Deletes at most `limit` rows of `family` owned by the user and returns
    /// how many were removed.
    async fn delete_batch(
        &mut self,
        family: EntityFamily,
        user_id: Uuid,
        limit: u64,
    ) -> Result<u64, StoreError>;

    /// Deletes the user row itself. Returns the number of rows removed.
    async fn delete_user(&mut self, user_id: Uuid) -> Result<u64, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// ErasureStoreState
///
/// The concrete type used to share the store across the application state.
pub type ErasureStoreState = Arc<dyn ErasureStore>;

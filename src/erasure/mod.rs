//! Account erasure engine.
//!
//! Permanently removes a user and every row that references them:
//! preflight validation, then a single transaction that soft-deletes the
//! account, purges each entity family in dependency order, and finally deletes
//! the user row. Either all of it commits or none of it does.

pub mod error;
pub mod postgres;
pub mod preflight;
pub mod preview;
pub mod purger;
pub mod schema;
pub mod soft_delete;
pub mod store;

use chrono::Utc;
use std::{collections::BTreeMap, time::Instant};
use uuid::Uuid;

pub use error::{ErasureError, FailureContext, StoreError};
pub use postgres::PgErasureStore;
pub use purger::BatchPolicy;
pub use schema::{CASCADE_ORDER, EntityFamily, PreviewFamily};
pub use store::{ErasureStore, ErasureStoreState, ErasureTransaction};

use crate::{
    config::ErasureConfig,
    models::{ErasurePreview, ErasureSummary},
};

/// EraseOptions
///
/// Per-call switches. The soft-delete guard is on unless a caller explicitly
/// turns it off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseOptions {
    pub soft_delete_guard: bool,
}

impl Default for EraseOptions {
    fn default() -> Self {
        Self {
            soft_delete_guard: true,
        }
    }
}

/// Tracks how far the cascade got, so a failure can report it.
#[derive(Default)]
struct CascadeProgress {
    last_family: Option<&'static str>,
    deleted: BTreeMap<String, u64>,
}

enum CascadeOutcome {
    Erased,
    // Another erasure of the same user committed while we waited on the lock.
    AlreadyErased,
}

/// ErasureEngine
///
/// The cascade orchestrator and the public entry point of the erasure core.
/// Cheap to clone; the store handle is shared.
#[derive(Clone)]
pub struct ErasureEngine {
    store: ErasureStoreState,
    config: ErasureConfig,
}

impl ErasureEngine {
    pub fn new(store: ErasureStoreState, config: ErasureConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ErasureConfig {
        &self.config
    }

    /// erase_user
    ///
    /// Permanently removes the user and all dependent rows.
    ///
    /// Runs the preflight check, then one transaction bounded by the configured
    /// timeout. Any failure rolls the transaction back and is returned as a
    /// classified `ErasureError`; nothing partial is ever committed.
    pub async fn erase_user(
        &self,
        user_id: Uuid,
        options: EraseOptions,
    ) -> Result<ErasureSummary, ErasureError> {
        let started = Instant::now();
        preflight::validate(self.store.as_ref(), user_id, started).await?;

        let checkpoint = options.soft_delete_guard && self.config.soft_delete_checkpoint;
        if checkpoint && !self.commit_soft_delete(user_id, started).await? {
            // A concurrent erasure committed before the checkpoint got the lock.
            return Ok(self.finish(user_id, started, BTreeMap::new(), true));
        }

        let mut tx = self.begin(user_id, started).await?;
        let mut progress = CascadeProgress::default();
        let in_tx_guard = options.soft_delete_guard && !checkpoint;

        let outcome = tokio::time::timeout(
            self.config.transaction_timeout,
            self.run_cascade(&mut *tx, user_id, in_tx_guard, &mut progress),
        )
        .await;

        let outcome = match outcome {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(source)) => {
                abort(&mut *tx, user_id).await;
                return Err(self.fail(source, user_id, started, progress.last_family));
            }
            Err(_) => {
                abort(&mut *tx, user_id).await;
                let source = StoreError::Timeout(format!(
                    "cascade exceeded {}ms",
                    self.config.transaction_timeout.as_millis()
                ));
                return Err(self.fail(source, user_id, started, progress.last_family));
            }
        };

        if let Err(source) = tx.commit().await {
            return Err(self.fail(source, user_id, started, progress.last_family));
        }

        let already_erased = matches!(outcome, CascadeOutcome::AlreadyErased);
        Ok(self.finish(user_id, started, progress.deleted, already_erased))
    }

    /// Builds the success summary and logs the outcome.
    fn finish(
        &self,
        user_id: Uuid,
        started: Instant,
        deleted_counts: BTreeMap<String, u64>,
        already_erased: bool,
    ) -> ErasureSummary {
        let summary = ErasureSummary {
            user_id,
            success: true,
            deleted_counts,
            duration_ms: elapsed_ms(started),
            already_erased,
        };

        if summary.already_erased {
            tracing::info!(user_id = %user_id, "account was erased by a concurrent request");
        } else {
            tracing::info!(
                user_id = %user_id,
                removed = summary.total_removed(),
                duration_ms = summary.duration_ms,
                "account erased"
            );
        }
        summary
    }

    /// preview_erasure
    ///
    /// Read-only counts for confirmation screens and support audits. See
    /// `ErasurePreview` for why these differ from the erasure's own counts.
    pub async fn preview_erasure(&self, user_id: Uuid) -> ErasurePreview {
        preview::report(self.store.as_ref(), user_id).await
    }

    async fn run_cascade(
        &self,
        tx: &mut dyn ErasureTransaction,
        user_id: Uuid,
        soft_delete_guard: bool,
        progress: &mut CascadeProgress,
    ) -> Result<CascadeOutcome, StoreError> {
        if !tx.lock_user(user_id).await? {
            return Ok(CascadeOutcome::AlreadyErased);
        }

        // First write of the transaction, ahead of any purge.
        if soft_delete_guard {
            progress.last_family = Some(schema::USER_FAMILY);
            soft_delete::apply(tx, user_id, Utc::now()).await?;
        }

        let policy = self.config.batch_policy();
        for family in CASCADE_ORDER {
            progress.last_family = Some(family.name());
            let removed = purger::purge_family(tx, family, user_id, &policy).await?;
            progress.deleted.insert(family.name().to_string(), removed);
        }

        progress.last_family = Some(schema::USER_FAMILY);
        let removed = tx.delete_user(user_id).await?;
        if removed == 0 {
            return Err(StoreError::RowNotFound);
        }
        progress
            .deleted
            .insert(schema::USER_FAMILY.to_string(), removed);

        Ok(CascadeOutcome::Erased)
    }

    /// Soft-delete committed in its own short transaction, ahead of the
    /// cascade. Leaves the account deactivated even if the cascade later fails.
    ///
    /// Returns `false` when the user row was already gone once the lock was
    /// held; nothing is written in that case.
    async fn commit_soft_delete(&self, user_id: Uuid, started: Instant) -> Result<bool, ErasureError> {
        let mut tx = self.begin(user_id, started).await?;
        let result: Result<bool, StoreError> = async {
            if !tx.lock_user(user_id).await? {
                tx.commit().await?;
                return Ok(false);
            }
            soft_delete::apply(&mut *tx, user_id, Utc::now()).await?;
            tx.commit().await?;
            Ok(true)
        }
        .await;

        match result {
            Ok(present) => {
                if present {
                    tracing::info!(user_id = %user_id, "soft-delete checkpoint committed");
                }
                Ok(present)
            }
            Err(source) => {
                abort(&mut *tx, user_id).await;
                Err(self.fail(source, user_id, started, Some(schema::USER_FAMILY)))
            }
        }
    }

    /// Opens a transaction, waiting at most the configured timeout for it.
    async fn begin(
        &self,
        user_id: Uuid,
        started: Instant,
    ) -> Result<Box<dyn ErasureTransaction>, ErasureError> {
        let timeout = self.config.transaction_timeout;
        match tokio::time::timeout(timeout, self.store.begin(timeout)).await {
            Ok(Ok(tx)) => Ok(tx),
            Ok(Err(source)) => Err(self.fail(source, user_id, started, None)),
            Err(_) => {
                let source = StoreError::Timeout(format!(
                    "no transaction within {}ms",
                    timeout.as_millis()
                ));
                Err(self.fail(source, user_id, started, None))
            }
        }
    }

    fn fail(
        &self,
        source: StoreError,
        user_id: Uuid,
        started: Instant,
        last_family: Option<&'static str>,
    ) -> ErasureError {
        let err = ErasureError::classify(source, FailureContext::since(user_id, started, last_family));
        tracing::error!(
            user_id = %user_id,
            kind = err.kind(),
            retryable = err.is_retryable(),
            "account erasure failed: {}",
            err
        );
        err
    }
}

/// Rolls back, logging (not returning) a rollback failure so the original
/// error still reaches the caller.
async fn abort(tx: &mut dyn ErasureTransaction, user_id: Uuid) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(user_id = %user_id, error = %e, "rollback after failed erasure also failed");
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

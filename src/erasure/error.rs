//! Error types for the erasure engine.

use std::{fmt, time::Instant};
use thiserror::Error;
use uuid::Uuid;

// PostgreSQL SQLSTATE codes the erasure path tells apart.
const FOREIGN_KEY_VIOLATION: &str = "23503";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const QUERY_CANCELED: &str = "57014";

/// StoreError
///
/// A failure reported by the data store, already sorted into the few shapes
/// the orchestrator reacts to differently.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("row not found")]
    RowNotFound,

    #[error("transaction already finished")]
    TransactionClosed,

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => return StoreError::RowNotFound,
            sqlx::Error::PoolTimedOut => {
                return StoreError::Timeout("timed out acquiring a connection".to_string());
            }
            _ => {}
        }

        let (code, message) = match &err {
            sqlx::Error::Database(db_err) => (
                db_err.code().map(|code| code.into_owned()),
                db_err.message().to_string(),
            ),
            _ => (None, String::new()),
        };

        match code.as_deref() {
            Some(FOREIGN_KEY_VIOLATION) => StoreError::ForeignKeyViolation(message),
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED) => StoreError::Conflict(message),
            Some(LOCK_NOT_AVAILABLE | QUERY_CANCELED) => StoreError::Timeout(message),
            _ => StoreError::Database(err),
        }
    }
}

/// FailureContext
///
/// What an operator needs to triage a failed erasure: whose account, how long
/// the transaction had been running, and which family was being purged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    pub user_id: Uuid,
    pub elapsed_ms: u64,
    pub last_family: Option<&'static str>,
}

impl FailureContext {
    /// Context for a failure of the erasure that began at `started`.
    pub fn since(user_id: Uuid, started: Instant, last_family: Option<&'static str>) -> Self {
        Self {
            user_id,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            last_family,
        }
    }
}

impl fmt::Display for FailureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user {} after {}ms (last family: {})",
            self.user_id,
            self.elapsed_ms,
            self.last_family.unwrap_or("none")
        )
    }
}

/// ErasureError
///
/// The classified outcome of a failed erasure. Validation failures carry the
/// user id only; transactional failures also carry a `FailureContext` and the
/// underlying store error.
#[derive(Debug, Error)]
pub enum ErasureError {
    #[error("user {user_id} not found")]
    NotFound { user_id: Uuid },

    #[error("user {user_id} holds protected role '{role}'")]
    ProtectedAccount { user_id: Uuid, role: String },

    #[error("referential ordering violation for {context}: {source}")]
    ReferentialOrderingViolation {
        context: FailureContext,
        source: StoreError,
    },

    #[error("user row already deleted for {context}")]
    AlreadyDeleted { context: FailureContext },

    #[error("transaction conflict for {context}: {source}")]
    TransactionConflict {
        context: FailureContext,
        source: StoreError,
    },

    #[error("transaction timed out for {context}: {source}")]
    TransactionTimeout {
        context: FailureContext,
        source: StoreError,
    },

    #[error("erasure failed for {context}: {source}")]
    Unknown {
        context: FailureContext,
        source: StoreError,
    },
}

impl ErasureError {
    /// Sorts a store failure into the erasure taxonomy.
    pub fn classify(source: StoreError, context: FailureContext) -> Self {
        match source {
            StoreError::ForeignKeyViolation(_) => {
                ErasureError::ReferentialOrderingViolation { context, source }
            }
            StoreError::Conflict(_) => ErasureError::TransactionConflict { context, source },
            StoreError::Timeout(_) => ErasureError::TransactionTimeout { context, source },
            StoreError::RowNotFound => ErasureError::AlreadyDeleted { context },
            StoreError::TransactionClosed | StoreError::Database(_) => {
                ErasureError::Unknown { context, source }
            }
        }
    }

    /// Only transient contention is worth retrying from the top.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErasureError::TransactionConflict { .. } | ErasureError::TransactionTimeout { .. }
        )
    }

    /// Short machine-readable tag for logs and response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ErasureError::NotFound { .. } => "not_found",
            ErasureError::ProtectedAccount { .. } => "protected_account",
            ErasureError::ReferentialOrderingViolation { .. } => "referential_ordering_violation",
            ErasureError::AlreadyDeleted { .. } => "already_deleted",
            ErasureError::TransactionConflict { .. } => "transaction_conflict",
            ErasureError::TransactionTimeout { .. } => "transaction_timeout",
            ErasureError::Unknown { .. } => "unknown",
        }
    }

    pub fn context(&self) -> Option<&FailureContext> {
        match self {
            ErasureError::NotFound { .. } | ErasureError::ProtectedAccount { .. } => None,
            ErasureError::ReferentialOrderingViolation { context, .. }
            | ErasureError::AlreadyDeleted { context }
            | ErasureError::TransactionConflict { context, .. }
            | ErasureError::TransactionTimeout { context, .. }
            | ErasureError::Unknown { context, .. } => Some(context),
        }
    }
}

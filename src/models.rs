use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

/// The highest-privilege role. Accounts holding it are never erased through
/// the self-service or moderation paths.
pub const ADMIN_ROLE: &str = "admin";

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The canonical identity record stored in the `users` table. Every dependent
/// entity family references this row, directly or through a parent.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    // Unique identity fields, scrambled by the soft-delete safety net.
    pub email: String,
    pub username: String,
    // The RBAC field: 'user', 'moderator' or 'admin'.
    pub role: String,

    // Activity flags.
    pub is_active: bool,
    pub is_banned: bool,
    pub ban_reason: Option<String>,

    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_protected(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

// --- Erasure Schemas ---

/// CollectionCounts
///
/// Sizes of the principal collections a user owns, gathered by the preflight
/// check for the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct CollectionCounts {
    pub posts: i64,
    pub comments: i64,
    pub followers: i64,
    pub following: i64,
    pub stories: i64,
    pub conversations: i64,
}

/// ErasureImpact
///
/// A user together with the counts of what they own. Read-only snapshot taken
/// before the erasure transaction opens.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ErasureImpact {
    pub user: User,
    pub counts: CollectionCounts,
}

/// ErasureSummary
///
/// Returned by a successful erasure (and serialized as the body of the
/// "delete my account" response).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ErasureSummary {
    pub user_id: Uuid,
    pub success: bool,
    /// Rows removed per entity family, plus the `users` row itself.
    pub deleted_counts: BTreeMap<String, u64>,
    pub duration_ms: u64,
    /// True when a concurrent erasure of the same user finished first and
    /// this call found nothing left to remove.
    pub already_erased: bool,
}

impl ErasureSummary {
    pub fn total_removed(&self) -> u64 {
        self.deleted_counts.values().sum()
    }
}

/// ErasurePreview
///
/// Read-only, best-effort counts of what an erasure would remove.
///
/// *Note*: This covers a smaller, user-facing subset of families than the
/// erasure itself, so its numbers will not match `ErasureSummary.deleted_counts`.
/// Families whose count query failed are listed in `unavailable` instead of
/// failing the whole preview.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ErasurePreview {
    pub user_id: Uuid,
    pub user_exists: bool,
    pub counts: BTreeMap<String, i64>,
    pub unavailable: Vec<String>,
}

/// ErrorResponse
///
/// Generic JSON body for failed erasure requests. Only the classified kind is
/// exposed, never store internals.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ErrorResponse {
    pub error: String,
    pub retryable: bool,
}

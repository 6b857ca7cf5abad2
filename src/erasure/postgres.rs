use async_trait::async_trait;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::{
    error::StoreError,
    schema::{EntityFamily, PreviewFamily},
    soft_delete::ScrambledIdentity,
    store::{ErasureStore, ErasureTransaction},
};
use crate::models::{CollectionCounts, ErasureImpact, User};

/// PgErasureStore
///
/// `ErasureStore` backed by PostgreSQL. Holds its own pool handle; nothing
/// here is process-global, so tests can point one at an isolated database.
#[derive(Clone)]
pub struct PgErasureStore {
    pool: PgPool,
}

impl PgErasureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ImpactRow {
    #[sqlx(flatten)]
    user: User,
    #[sqlx(flatten)]
    counts: CollectionCounts,
}

/// COUNT query for each preview family. `$1` is the user id.
fn preview_query(family: PreviewFamily) -> &'static str {
    match family {
        PreviewFamily::Posts => "SELECT COUNT(*) FROM posts WHERE user_id = $1",
        PreviewFamily::Comments => "SELECT COUNT(*) FROM comments WHERE user_id = $1",
        PreviewFamily::Likes => "SELECT COUNT(*) FROM likes WHERE user_id = $1",
        PreviewFamily::SavedPosts => "SELECT COUNT(*) FROM saved_posts WHERE user_id = $1",
        PreviewFamily::Followers => "SELECT COUNT(*) FROM follows WHERE following_id = $1",
        PreviewFamily::Following => "SELECT COUNT(*) FROM follows WHERE follower_id = $1",
        PreviewFamily::FollowRequests => {
            "SELECT COUNT(*) FROM follow_requests WHERE requester_id = $1 OR target_id = $1"
        }
        PreviewFamily::Stories => "SELECT COUNT(*) FROM stories WHERE user_id = $1",
        PreviewFamily::Conversations => {
            "SELECT COUNT(*) FROM conversations WHERE participant_one_id = $1 OR participant_two_id = $1"
        }
        PreviewFamily::Messages => "SELECT COUNT(*) FROM messages WHERE sender_id = $1",
        PreviewFamily::Notifications => "SELECT COUNT(*) FROM notifications WHERE user_id = $1",
    }
}

/// Bounded delete for one family. Postgres has no `DELETE ... LIMIT`, so the
/// batch is picked by primary key in a sub-select. Physical row ids would not
/// do: a row updated by another transaction moves, and the delete would skip it.
fn batch_delete_sql(family: EntityFamily) -> String {
    let table = family.table();
    let key = family.key_columns();
    format!(
        "DELETE FROM {table} WHERE ({key}) IN (SELECT {key} FROM {table} WHERE {filter} LIMIT $2)",
        filter = family.owner_filter()
    )
}

#[async_trait]
impl ErasureStore for PgErasureStore {
    /// load_impact
    ///
    /// One round trip: the user row plus the principal collection counts as
    /// scalar sub-selects.
    async fn load_impact(&self, user_id: Uuid) -> Result<Option<ErasureImpact>, StoreError> {
        let row = sqlx::query_as::<_, ImpactRow>(
            r#"
            SELECT
                u.id, u.email, u.username, u.role, u.is_active, u.is_banned,
                u.ban_reason, u.created_at, u.updated_at,
                (SELECT COUNT(*) FROM posts WHERE user_id = u.id) AS posts,
                (SELECT COUNT(*) FROM comments WHERE user_id = u.id) AS comments,
                (SELECT COUNT(*) FROM follows WHERE following_id = u.id) AS followers,
                (SELECT COUNT(*) FROM follows WHERE follower_id = u.id) AS following,
                (SELECT COUNT(*) FROM stories WHERE user_id = u.id) AS stories,
                (SELECT COUNT(*) FROM conversations
                    WHERE participant_one_id = u.id OR participant_two_id = u.id) AS conversations
            FROM users u
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ErasureImpact {
            user: r.user,
            counts: r.counts,
        }))
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, StoreError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn count(&self, family: PreviewFamily, user_id: Uuid) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(preview_query(family))
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// begin
    ///
    /// Opens a transaction and caps every statement inside it at `timeout`
    /// with `SET LOCAL`, which reverts on commit or rollback.
    async fn begin(&self, timeout: Duration) -> Result<Box<dyn ErasureTransaction>, StoreError> {
        let mut tx = self.pool.begin().await?;
        // SET does not take bind parameters; the value is an integer we format.
        let statement_timeout = format!("SET LOCAL statement_timeout = {}", timeout.as_millis());
        sqlx::query(&statement_timeout).execute(&mut *tx).await?;
        Ok(Box::new(PgErasureTransaction { tx: Some(tx) }))
    }
}

/// PgErasureTransaction
///
/// Wraps a live sqlx transaction. `commit`/`rollback` consume the inner
/// transaction; any call afterwards fails with `TransactionClosed`.
pub struct PgErasureTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgErasureTransaction {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.tx.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl ErasureTransaction for PgErasureTransaction {
    /// lock_user
    ///
    /// Transaction-scoped advisory lock keyed on the user id: a second erasure
    /// of the same user blocks here until the first one ends, then sees
    /// whether the row survived.
    async fn lock_user(&mut self, user_id: Uuid) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(exists)
    }

    async fn soft_delete_user(
        &mut self,
        user_id: Uuid,
        identity: &ScrambledIdentity,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_active = false,
                is_banned = true,
                ban_reason = $2,
                email = $3,
                username = $4,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&identity.ban_reason)
        .bind(&identity.email)
        .bind(&identity.username)
        .bind(identity.erased_at)
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_batch(
        &mut self,
        family: EntityFamily,
        user_id: Uuid,
        limit: u64,
    ) -> Result<u64, StoreError> {
        let sql = batch_delete_sql(family);
        let result = sqlx::query(&sql)
            .bind(user_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .execute(self.conn()?)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_user(&mut self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(self.conn()?)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        // Already finished: nothing left to undo.
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

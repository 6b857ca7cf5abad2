//! In-memory `ErasureStore` with transaction semantics.
//!
//! Each transaction works on a private copy of the tables and only publishes
//! it on commit. Foreign keys are enforced: a row cannot be deleted while
//! another row points at it, and the user cannot be deleted while anything
//! still references it. Faults can be injected per family.

use async_trait::async_trait;
use social_portal::{
    erasure::{
        EntityFamily, ErasureStore, ErasureTransaction, PreviewFamily, StoreError,
        soft_delete::ScrambledIdentity,
    },
    models::{CollectionCounts, ErasureImpact, User},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
    time::Duration,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Row {
    pub id: Uuid,
    /// Users this row references. The first one is the owner.
    pub users: Vec<Uuid>,
    /// Rows in other families this row references.
    pub parents: Vec<(EntityFamily, Uuid)>,
}

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub users: BTreeMap<Uuid, User>,
    pub rows: BTreeMap<EntityFamily, Vec<Row>>,
}

impl Tables {
    pub fn family_rows(&self, family: EntityFamily) -> &[Row] {
        self.rows.get(&family).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, family: EntityFamily, id: Uuid) -> bool {
        self.family_rows(family).iter().any(|r| r.id == id)
    }

    pub fn row_ids(&self) -> BTreeSet<(EntityFamily, Uuid)> {
        self.rows
            .iter()
            .flat_map(|(family, rows)| rows.iter().map(move |r| (*family, r.id)))
            .collect()
    }

    pub fn total_rows(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    /// Rows that name the user directly.
    pub fn referencing_user(&self, user_id: Uuid) -> usize {
        self.rows
            .values()
            .flatten()
            .filter(|r| r.users.contains(&user_id))
            .count()
    }

    /// Rows whose parent no longer exists.
    pub fn dangling(&self) -> usize {
        self.rows
            .values()
            .flatten()
            .filter(|r| r.parents.iter().any(|(f, id)| !self.contains(*f, *id)))
            .count()
    }

    /// Whether the row goes with the user: it names them, or it hangs off a
    /// parent that does.
    fn doomed(&self, row: &Row, user_id: Uuid) -> bool {
        row.users.contains(&user_id)
            || row.parents.iter().any(|(family, parent_id)| {
                self.family_rows(*family)
                    .iter()
                    .any(|p| p.id == *parent_id && self.doomed(p, user_id))
            })
    }

    fn referenced(&self, family: EntityFamily, id: Uuid) -> bool {
        self.rows
            .values()
            .flatten()
            .any(|r| r.parents.contains(&(family, id)))
    }

    fn count_where(&self, family: EntityFamily, pred: impl Fn(&Row) -> bool) -> i64 {
        self.family_rows(family).iter().filter(|r| pred(r)).count() as i64
    }

    fn owned(&self, family: EntityFamily, user_id: Uuid) -> i64 {
        self.count_where(family, |r| r.users.first() == Some(&user_id))
    }

    fn preview_count(&self, family: PreviewFamily, user_id: Uuid) -> i64 {
        match family {
            PreviewFamily::Posts => self.owned(EntityFamily::Posts, user_id),
            PreviewFamily::Comments => self.owned(EntityFamily::Comments, user_id),
            PreviewFamily::Likes => self.owned(EntityFamily::Likes, user_id),
            PreviewFamily::SavedPosts => self.owned(EntityFamily::SavedPosts, user_id),
            PreviewFamily::Followers => {
                self.count_where(EntityFamily::Follows, |r| r.users.get(1) == Some(&user_id))
            }
            PreviewFamily::Following => self.owned(EntityFamily::Follows, user_id),
            PreviewFamily::FollowRequests => {
                self.count_where(EntityFamily::FollowRequests, |r| r.users.contains(&user_id))
            }
            PreviewFamily::Stories => self.owned(EntityFamily::Stories, user_id),
            PreviewFamily::Conversations => {
                self.count_where(EntityFamily::Conversations, |r| r.users.contains(&user_id))
            }
            PreviewFamily::Messages => self.owned(EntityFamily::Messages, user_id),
            PreviewFamily::Notifications => self.owned(EntityFamily::Notifications, user_id),
        }
    }
}

/// Store-level failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    ForeignKey,
    Conflict,
    Timeout,
    Broken,
}

impl Fault {
    fn error(self, what: &str) -> StoreError {
        match self {
            Fault::ForeignKey => StoreError::ForeignKeyViolation(format!("{what} still referenced")),
            Fault::Conflict => StoreError::Conflict(format!("{what}: could not serialize access")),
            Fault::Timeout => StoreError::Timeout(format!("{what}: statement timeout")),
            Fault::Broken => StoreError::TransactionClosed,
        }
    }
}

/// Every store operation, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Begin,
    Lock,
    SoftDelete,
    DeleteBatch {
        family: EntityFamily,
        limit: u64,
        removed: u64,
    },
    DeleteUser,
    Commit,
    Rollback,
}

#[derive(Default)]
struct Knobs {
    fail_on: Option<(EntityFamily, Fault)>,
    fail_begin: Option<Fault>,
    failing_preview: Option<PreviewFamily>,
    failing_user_lookup: bool,
    user_vanishes: bool,
    batch_latency: Option<Duration>,
    fail_load: Option<Fault>,
    load_latency: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    committed: Arc<Mutex<Tables>>,
    calls: Arc<Mutex<Vec<Call>>>,
    knobs: Arc<Mutex<Knobs>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) -> Uuid {
        let id = user.id;
        self.committed.lock().unwrap().users.insert(id, user);
        id
    }

    pub fn insert(
        &self,
        family: EntityFamily,
        users: &[Uuid],
        parents: &[(EntityFamily, Uuid)],
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.committed
            .lock()
            .unwrap()
            .rows
            .entry(family)
            .or_default()
            .push(Row {
                id,
                users: users.to_vec(),
                parents: parents.to_vec(),
            });
        id
    }

    pub fn insert_many(&self, family: EntityFamily, owner: Uuid, n: usize) {
        for _ in 0..n {
            self.insert(family, &[owner], &[]);
        }
    }

    /// Committed state, as another connection would see it.
    pub fn snapshot(&self) -> Tables {
        self.committed.lock().unwrap().clone()
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.committed.lock().unwrap().users.get(&id).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Removed counts of every batch issued against `family`.
    pub fn batches(&self, family: EntityFamily) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DeleteBatch {
                    family: f, removed, ..
                } if f == family => Some(removed),
                _ => None,
            })
            .collect()
    }

    pub fn fail_on(&self, family: EntityFamily, fault: Fault) {
        self.knobs.lock().unwrap().fail_on = Some((family, fault));
    }

    pub fn fail_begin(&self, fault: Fault) {
        self.knobs.lock().unwrap().fail_begin = Some(fault);
    }

    pub fn fail_preview(&self, family: PreviewFamily) {
        self.knobs.lock().unwrap().failing_preview = Some(family);
    }

    pub fn fail_user_lookup(&self) {
        self.knobs.lock().unwrap().failing_user_lookup = true;
    }

    /// Simulates a concurrent erasure committing while this one waits on the
    /// per-user lock.
    pub fn user_vanishes_before_lock(&self) {
        self.knobs.lock().unwrap().user_vanishes = true;
    }

    pub fn batch_latency(&self, latency: Duration) {
        self.knobs.lock().unwrap().batch_latency = Some(latency);
    }

    /// Makes the preflight read fail after `latency`.
    pub fn slow_failing_load(&self, latency: Duration, fault: Fault) {
        let mut knobs = self.knobs.lock().unwrap();
        knobs.load_latency = Some(latency);
        knobs.fail_load = Some(fault);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ErasureStore for MemoryStore {
    async fn load_impact(&self, user_id: Uuid) -> Result<Option<ErasureImpact>, StoreError> {
        let (fault, latency) = {
            let knobs = self.knobs.lock().unwrap();
            (knobs.fail_load, knobs.load_latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(fault) = fault {
            return Err(fault.error("users"));
        }

        let tables = self.committed.lock().unwrap();
        let Some(user) = tables.users.get(&user_id).cloned() else {
            return Ok(None);
        };
        let counts = CollectionCounts {
            posts: tables.owned(EntityFamily::Posts, user_id),
            comments: tables.owned(EntityFamily::Comments, user_id),
            followers: tables.preview_count(PreviewFamily::Followers, user_id),
            following: tables.preview_count(PreviewFamily::Following, user_id),
            stories: tables.owned(EntityFamily::Stories, user_id),
            conversations: tables.preview_count(PreviewFamily::Conversations, user_id),
        };
        Ok(Some(ErasureImpact { user, counts }))
    }

    async fn user_exists(&self, user_id: Uuid) -> Result<bool, StoreError> {
        if self.knobs.lock().unwrap().failing_user_lookup {
            return Err(Fault::Broken.error("users"));
        }
        Ok(self.committed.lock().unwrap().users.contains_key(&user_id))
    }

    async fn count(&self, family: PreviewFamily, user_id: Uuid) -> Result<i64, StoreError> {
        if self.knobs.lock().unwrap().failing_preview == Some(family) {
            return Err(Fault::Timeout.error(family.name()));
        }
        Ok(self.committed.lock().unwrap().preview_count(family, user_id))
    }

    async fn begin(&self, _timeout: Duration) -> Result<Box<dyn ErasureTransaction>, StoreError> {
        self.record(Call::Begin);
        if let Some(fault) = self.knobs.lock().unwrap().fail_begin {
            return Err(fault.error("begin"));
        }
        let working = self.committed.lock().unwrap().clone();
        Ok(Box::new(MemoryTx {
            store: self.clone(),
            working: Some(working),
        }))
    }
}

pub struct MemoryTx {
    store: MemoryStore,
    working: Option<Tables>,
}

impl MemoryTx {
    fn tables(&mut self) -> Result<&mut Tables, StoreError> {
        self.working.as_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl ErasureTransaction for MemoryTx {
    async fn lock_user(&mut self, user_id: Uuid) -> Result<bool, StoreError> {
        self.store.record(Call::Lock);
        let vanished = self.store.knobs.lock().unwrap().user_vanishes;
        let tables = self.tables()?;
        Ok(!vanished && tables.users.contains_key(&user_id))
    }

    async fn soft_delete_user(
        &mut self,
        user_id: Uuid,
        identity: &ScrambledIdentity,
    ) -> Result<u64, StoreError> {
        self.store.record(Call::SoftDelete);
        let tables = self.tables()?;
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(0);
        };
        user.is_active = false;
        user.is_banned = true;
        user.ban_reason = Some(identity.ban_reason.clone());
        user.email = identity.email.clone();
        user.username = identity.username.clone();
        user.updated_at = identity.erased_at;
        Ok(1)
    }

    async fn delete_batch(
        &mut self,
        family: EntityFamily,
        user_id: Uuid,
        limit: u64,
    ) -> Result<u64, StoreError> {
        let (fault, latency) = {
            let knobs = self.store.knobs.lock().unwrap();
            (knobs.fail_on, knobs.batch_latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some((failing, fault)) = fault {
            if failing == family {
                return Err(fault.error(family.name()));
            }
        }

        let tables = self.tables()?;
        let doomed: Vec<Uuid> = tables
            .family_rows(family)
            .iter()
            .filter(|r| tables.doomed(r, user_id))
            .take(limit as usize)
            .map(|r| r.id)
            .collect();
        if let Some(id) = doomed.iter().find(|id| tables.referenced(family, **id)) {
            return Err(StoreError::ForeignKeyViolation(format!(
                "{} {} is still referenced",
                family.name(),
                id
            )));
        }
        tables
            .rows
            .entry(family)
            .or_default()
            .retain(|r| !doomed.contains(&r.id));

        let removed = doomed.len() as u64;
        self.store.record(Call::DeleteBatch {
            family,
            limit,
            removed,
        });
        Ok(removed)
    }

    async fn delete_user(&mut self, user_id: Uuid) -> Result<u64, StoreError> {
        self.store.record(Call::DeleteUser);
        let tables = self.tables()?;
        if tables.referencing_user(user_id) > 0 {
            return Err(StoreError::ForeignKeyViolation(format!(
                "user {user_id} is still referenced"
            )));
        }
        Ok(u64::from(tables.users.remove(&user_id).is_some()))
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tables = self.working.take().ok_or(StoreError::TransactionClosed)?;
        *self.store.committed.lock().unwrap() = tables;
        self.store.record(Call::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.working = None;
        self.store.record(Call::Rollback);
        Ok(())
    }
}

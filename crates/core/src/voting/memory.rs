//! In-memory vote store.
//!
//! Used by tests and local tooling. Units of work buffer their writes and
//! apply them on commit; dropping a unit discards them. A single fault can be
//! armed to exercise the ledger's failure paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use agora_shared::types::UserId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::VoteError;
use super::locks::VoteKey;
use super::repository::{VoteRepository, VoteStore, VoteUnitOfWork};
use super::types::{TargetKind, VoteRecord, VoteTarget, VoteValue};

/// A one-shot failure injected into the next matching operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `begin` fails with `StorageUnavailable`.
    Unavailable,
    /// Another writer commits a record for the key just before `insert`,
    /// which then reports `DuplicateVote`.
    RacedInsert,
    /// `insert` reports `DuplicateVote` although no record exists.
    PhantomConflict,
    /// `sum_values` or `sum_values_by_target` fails with `StorageUnavailable`.
    FailAggregate,
    /// `commit` fails with `StorageUnavailable`.
    FailCommit,
}

type Pending = HashMap<VoteKey, Option<VoteRecord>>;

#[derive(Debug, Default)]
struct LedgerState {
    votes: HashMap<VoteKey, VoteRecord>,
    targets: HashSet<VoteTarget>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<LedgerState>,
    fault: Mutex<Option<Fault>>,
    latency: Mutex<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn trip(&self, fault: Fault) -> bool {
        let mut armed = lock(&self.fault);
        if *armed == Some(fault) {
            *armed = None;
            true
        } else {
            false
        }
    }

    async fn delay(&self) {
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn lookup(&self, pending: Option<&Mutex<Pending>>, key: VoteKey) -> Option<VoteRecord> {
        if let Some(pending) = pending
            && let Some(entry) = lock(pending).get(&key)
        {
            return entry.clone();
        }
        lock(&self.state).votes.get(&key).cloned()
    }

    fn write(&self, pending: Option<&Mutex<Pending>>, key: VoteKey, record: Option<VoteRecord>) {
        match pending {
            Some(pending) => {
                lock(pending).insert(key, record);
            }
            None => {
                let mut state = lock(&self.state);
                match record {
                    Some(record) => state.votes.insert(key, record),
                    None => state.votes.remove(&key),
                };
            }
        }
    }

    async fn find(
        &self,
        pending: Option<&Mutex<Pending>>,
        voter_id: UserId,
        target: VoteTarget,
    ) -> Result<Option<VoteRecord>, VoteError> {
        self.delay().await;
        Ok(self.lookup(pending, VoteKey::new(voter_id, target)))
    }

    async fn insert(
        &self,
        pending: Option<&Mutex<Pending>>,
        voter_id: UserId,
        target: VoteTarget,
        value: VoteValue,
        cast_at: DateTime<Utc>,
    ) -> Result<VoteRecord, VoteError> {
        self.delay().await;
        let key = VoteKey::new(voter_id, target);

        if self.trip(Fault::RacedInsert) {
            let competing = VoteRecord {
                voter_id,
                target,
                value: value.flipped(),
                cast_at,
            };
            lock(&self.state).votes.insert(key, competing);
            return Err(VoteError::DuplicateVote { voter_id, target });
        }
        if self.trip(Fault::PhantomConflict) || self.lookup(pending, key).is_some() {
            return Err(VoteError::DuplicateVote { voter_id, target });
        }

        let record = VoteRecord {
            voter_id,
            target,
            value,
            cast_at,
        };
        self.write(pending, key, Some(record.clone()));
        Ok(record)
    }

    async fn update_value(
        &self,
        pending: Option<&Mutex<Pending>>,
        record: &VoteRecord,
        value: VoteValue,
        cast_at: DateTime<Utc>,
    ) -> Result<VoteRecord, VoteError> {
        self.delay().await;
        let key = VoteKey::new(record.voter_id, record.target);
        if self.lookup(pending, key).is_none() {
            return Err(VoteError::internal("vote record disappeared during update"));
        }

        let updated = VoteRecord {
            value,
            cast_at,
            ..record.clone()
        };
        self.write(pending, key, Some(updated.clone()));
        Ok(updated)
    }

    async fn delete(
        &self,
        pending: Option<&Mutex<Pending>>,
        record: &VoteRecord,
    ) -> Result<(), VoteError> {
        self.delay().await;
        self.write(pending, VoteKey::new(record.voter_id, record.target), None);
        Ok(())
    }

    fn score(&self, pending: Option<&Mutex<Pending>>, target: VoteTarget) -> i64 {
        let mut merged: HashMap<VoteKey, VoteRecord> = lock(&self.state)
            .votes
            .iter()
            .filter(|(key, _)| key.target == target)
            .map(|(key, record)| (*key, record.clone()))
            .collect();
        if let Some(pending) = pending {
            for (key, entry) in lock(pending).iter().filter(|(key, _)| key.target == target) {
                match entry {
                    Some(record) => merged.insert(*key, record.clone()),
                    None => merged.remove(key),
                };
            }
        }

        merged
            .values()
            .map(|record| i64::from(record.value.as_i16()))
            .sum()
    }

    async fn sum_values(
        &self,
        pending: Option<&Mutex<Pending>>,
        target: VoteTarget,
    ) -> Result<i64, VoteError> {
        self.delay().await;
        if self.trip(Fault::FailAggregate) {
            return Err(VoteError::storage("aggregate query failed"));
        }
        Ok(self.score(pending, target))
    }

    async fn sum_values_by_target(
        &self,
        pending: Option<&Mutex<Pending>>,
        kind: TargetKind,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, i64>, VoteError> {
        self.delay().await;
        if self.trip(Fault::FailAggregate) {
            return Err(VoteError::storage("aggregate query failed"));
        }
        Ok(ids
            .iter()
            .map(|&id| (id, self.score(pending, VoteTarget::new(kind, id))))
            .collect())
    }

    async fn find_by_voter(
        &self,
        pending: Option<&Mutex<Pending>>,
        voter_id: UserId,
        kind: TargetKind,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, VoteValue>, VoteError> {
        self.delay().await;
        Ok(ids
            .iter()
            .filter_map(|&id| {
                let key = VoteKey::new(voter_id, VoteTarget::new(kind, id));
                self.lookup(pending, key).map(|record| (id, record.value))
            })
            .collect())
    }

    async fn exists_target(&self, target: VoteTarget) -> Result<bool, VoteError> {
        self.delay().await;
        Ok(lock(&self.state).targets.contains(&target))
    }
}

/// Vote store kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVoteStore {
    inner: Arc<Inner>,
}

impl InMemoryVoteStore {
    /// Creates an empty store with no targets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a post or reply that can be voted on.
    pub fn add_target(&self, target: VoteTarget) {
        lock(&self.inner.state).targets.insert(target);
    }

    /// Removes a target together with its votes.
    pub fn remove_target(&self, target: VoteTarget) {
        let mut state = lock(&self.inner.state);
        state.targets.remove(&target);
        state.votes.retain(|key, _| key.target != target);
    }

    /// Snapshot of every committed record.
    #[must_use]
    pub fn records(&self) -> Vec<VoteRecord> {
        lock(&self.inner.state).votes.values().cloned().collect()
    }

    /// Arms a fault for the next matching operation.
    pub fn inject(&self, fault: Fault) {
        *lock(&self.inner.fault) = Some(fault);
    }

    /// Delays every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.inner.latency) = latency;
    }
}

impl VoteRepository for InMemoryVoteStore {
    async fn find(
        &self,
        voter_id: UserId,
        target: VoteTarget,
    ) -> Result<Option<VoteRecord>, VoteError> {
        self.inner.find(None, voter_id, target).await
    }

    async fn insert(
        &self,
        voter_id: UserId,
        target: VoteTarget,
        value: VoteValue,
        cast_at: DateTime<Utc>,
    ) -> Result<VoteRecord, VoteError> {
        self.inner
            .insert(None, voter_id, target, value, cast_at)
            .await
    }

    async fn update_value(
        &self,
        record: &VoteRecord,
        value: VoteValue,
        cast_at: DateTime<Utc>,
    ) -> Result<VoteRecord, VoteError> {
        self.inner.update_value(None, record, value, cast_at).await
    }

    async fn delete(&self, record: &VoteRecord) -> Result<(), VoteError> {
        self.inner.delete(None, record).await
    }

    async fn sum_values(&self, target: VoteTarget) -> Result<i64, VoteError> {
        self.inner.sum_values(None, target).await
    }

    async fn sum_values_by_target(
        &self,
        kind: TargetKind,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, i64>, VoteError> {
        self.inner.sum_values_by_target(None, kind, ids).await
    }

    async fn find_by_voter(
        &self,
        voter_id: UserId,
        kind: TargetKind,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, VoteValue>, VoteError> {
        self.inner.find_by_voter(None, voter_id, kind, ids).await
    }

    async fn exists_target(&self, target: VoteTarget) -> Result<bool, VoteError> {
        self.inner.exists_target(target).await
    }
}

impl VoteStore for InMemoryVoteStore {
    type Unit = InMemoryUnit;

    async fn begin(&self) -> Result<InMemoryUnit, VoteError> {
        self.inner.delay().await;
        if self.inner.trip(Fault::Unavailable) {
            return Err(VoteError::storage("store unavailable"));
        }
        Ok(InMemoryUnit {
            inner: Arc::clone(&self.inner),
            pending: Mutex::default(),
        })
    }
}

/// Buffered unit of work over an [`InMemoryVoteStore`].
#[derive(Debug)]
pub struct InMemoryUnit {
    inner: Arc<Inner>,
    pending: Mutex<Pending>,
}

impl VoteRepository for InMemoryUnit {
    async fn find(
        &self,
        voter_id: UserId,
        target: VoteTarget,
    ) -> Result<Option<VoteRecord>, VoteError> {
        self.inner.find(Some(&self.pending), voter_id, target).await
    }

    async fn insert(
        &self,
        voter_id: UserId,
        target: VoteTarget,
        value: VoteValue,
        cast_at: DateTime<Utc>,
    ) -> Result<VoteRecord, VoteError> {
        self.inner
            .insert(Some(&self.pending), voter_id, target, value, cast_at)
            .await
    }

    async fn update_value(
        &self,
        record: &VoteRecord,
        value: VoteValue,
        cast_at: DateTime<Utc>,
    ) -> Result<VoteRecord, VoteError> {
        self.inner
            .update_value(Some(&self.pending), record, value, cast_at)
            .await
    }

    async fn delete(&self, record: &VoteRecord) -> Result<(), VoteError> {
        self.inner.delete(Some(&self.pending), record).await
    }

    async fn sum_values(&self, target: VoteTarget) -> Result<i64, VoteError> {
        self.inner.sum_values(Some(&self.pending), target).await
    }

    async fn sum_values_by_target(
        &self,
        kind: TargetKind,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, i64>, VoteError> {
        self.inner
            .sum_values_by_target(Some(&self.pending), kind, ids)
            .await
    }

    async fn find_by_voter(
        &self,
        voter_id: UserId,
        kind: TargetKind,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, VoteValue>, VoteError> {
        self.inner
            .find_by_voter(Some(&self.pending), voter_id, kind, ids)
            .await
    }

    async fn exists_target(&self, target: VoteTarget) -> Result<bool, VoteError> {
        self.inner.exists_target(target).await
    }
}

impl VoteUnitOfWork for InMemoryUnit {
    async fn commit(self) -> Result<(), VoteError> {
        self.inner.delay().await;
        if self.inner.trip(Fault::FailCommit) {
            return Err(VoteError::storage("commit failed"));
        }

        let pending = self
            .pending
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let mut state = lock(&self.inner.state);
        for (key, entry) in pending {
            match entry {
                Some(record) => state.votes.insert(key, record),
                None => state.votes.remove(&key),
            };
        }
        Ok(())
    }
}

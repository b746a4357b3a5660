//! Persistence boundary for the vote ledger.
//!
//! These traits are implemented by the db crate (PostgreSQL) and by
//! [`InMemoryVoteStore`](super::InMemoryVoteStore).

use std::collections::HashMap;
use std::future::Future;

use agora_shared::types::UserId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::VoteError;
use super::types::{TargetKind, VoteRecord, VoteTarget, VoteValue};

/// CRUD on vote records by compound key `(voter, target)`.
pub trait VoteRepository: Send + Sync {
    /// Find the voter's record for a target.
    fn find(
        &self,
        voter_id: UserId,
        target: VoteTarget,
    ) -> impl Future<Output = Result<Option<VoteRecord>, VoteError>> + Send;

    /// Insert a new record.
    ///
    /// Fails with `VoteError::DuplicateVote` when a record already exists for
    /// the key. Implementations must not abort the surrounding unit of work
    /// in that case, so the caller can retry as an update.
    fn insert(
        &self,
        voter_id: UserId,
        target: VoteTarget,
        value: VoteValue,
        cast_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<VoteRecord, VoteError>> + Send;

    /// Overwrite the value and timestamp of an existing record.
    fn update_value(
        &self,
        record: &VoteRecord,
        value: VoteValue,
        cast_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<VoteRecord, VoteError>> + Send;

    /// Delete a record.
    fn delete(&self, record: &VoteRecord) -> impl Future<Output = Result<(), VoteError>> + Send;

    /// Sum of every stored value for the target; 0 when there are none.
    fn sum_values(&self, target: VoteTarget)
    -> impl Future<Output = Result<i64, VoteError>> + Send;

    /// Sums for several targets of one kind in one read.
    ///
    /// Ids missing from the result have a score of 0.
    fn sum_values_by_target(
        &self,
        kind: TargetKind,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<HashMap<Uuid, i64>, VoteError>> + Send;

    /// The voter's stored values on several targets of one kind.
    fn find_by_voter(
        &self,
        voter_id: UserId,
        kind: TargetKind,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<HashMap<Uuid, VoteValue>, VoteError>> + Send;

    /// Whether the post or reply exists.
    ///
    /// Inside a unit of work the answer holds until commit: a concurrent
    /// delete of the target waits for the unit to finish.
    fn exists_target(
        &self,
        target: VoteTarget,
    ) -> impl Future<Output = Result<bool, VoteError>> + Send;
}

/// An atomic unit of work over the ledger.
///
/// Dropping a unit without committing discards every write made through it.
pub trait VoteUnitOfWork: VoteRepository {
    /// Make the unit's writes visible.
    fn commit(self) -> impl Future<Output = Result<(), VoteError>> + Send;
}

/// A ledger store that can open units of work.
///
/// Direct [`VoteRepository`] calls on the store run outside any unit and are
/// used for read-only views.
pub trait VoteStore: VoteRepository {
    /// Unit of work type.
    type Unit: VoteUnitOfWork;

    /// Open a unit of work.
    fn begin(&self) -> impl Future<Output = Result<Self::Unit, VoteError>> + Send;
}

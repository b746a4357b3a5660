//! Vote casting.

use std::sync::Arc;
use std::time::Duration;

use agora_shared::types::UserId;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::error::VoteError;
use super::locks::{KeyLocks, VoteKey};
use super::repository::{VoteRepository, VoteStore, VoteUnitOfWork};
use super::types::{RequestedVote, VoteOutcome, VoteRecord, VoteState, VoteTarget, VoteValue};

/// Default bound on a single ledger operation.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// The vote ledger.
///
/// Owns the per-key locks that serialize casts within this process. Across
/// processes the store's unit of work and its uniqueness constraint take
/// over.
#[derive(Debug)]
pub struct VoteLedger<S: VoteStore> {
    store: Arc<S>,
    locks: KeyLocks,
    storage_timeout: Duration,
}

impl<S: VoteStore> VoteLedger<S> {
    /// Creates a ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<S>, storage_timeout: Duration) -> Self {
        Self {
            store,
            locks: KeyLocks::new(),
            storage_timeout,
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The bound applied to every operation.
    #[must_use]
    pub const fn storage_timeout(&self) -> Duration {
        self.storage_timeout
    }

    /// Sets the voter's vote on `target` to `requested_value`.
    ///
    /// `1` and `-1` store that vote, replacing any previous one. `0` removes
    /// the voter's vote, and is a no-op when there is none. The returned
    /// `net_score` is recomputed from the ledger inside the same unit of work
    /// as the write.
    ///
    /// # Errors
    ///
    /// - `InvalidValue` when `requested_value` is not 1, -1 or 0
    /// - `TargetNotFound` when the post or reply does not exist
    /// - `DuplicateVote` when a concurrent insert could not be reconciled
    /// - `UnknownVoter` when the store has no such user
    /// - `StorageUnavailable` when the store is unreachable or times out
    /// - `Internal` when the store reports an inconsistent state
    ///
    /// Nothing is written unless the call succeeds.
    pub async fn cast_vote(
        &self,
        voter_id: UserId,
        target: VoteTarget,
        requested_value: i64,
    ) -> Result<VoteOutcome, VoteError> {
        let request = RequestedVote::from_value(requested_value)?;

        let work = async {
            let _guard = self.locks.acquire(VoteKey::new(voter_id, target)).await;
            self.apply(voter_id, target, request).await
        };

        match tokio::time::timeout(self.storage_timeout, work).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => {
                if matches!(
                    err,
                    VoteError::StorageUnavailable(_) | VoteError::Internal(_)
                ) {
                    warn!(%voter_id, %target, error = %err, "Vote cast failed");
                }
                Err(err)
            }
            Err(_) => {
                warn!(
                    %voter_id,
                    %target,
                    timeout_ms = self.storage_timeout.as_millis(),
                    "Vote cast timed out"
                );
                Err(self.timed_out())
            }
        }
    }

    pub(super) fn timed_out(&self) -> VoteError {
        VoteError::storage(format!(
            "operation timed out after {} ms",
            self.storage_timeout.as_millis()
        ))
    }

    async fn apply(
        &self,
        voter_id: UserId,
        target: VoteTarget,
        request: RequestedVote,
    ) -> Result<VoteOutcome, VoteError> {
        // Dropping `unit` on any early return discards its writes.
        let unit = self.store.begin().await?;

        if !unit.exists_target(target).await? {
            return Err(VoteError::TargetNotFound(target));
        }

        let existing = unit.find(voter_id, target).await?;
        let transition = VoteState::of(existing.as_ref()).apply(request);
        let now = Utc::now();

        match (existing, request.stored_value()) {
            (Some(record), None) => unit.delete(&record).await?,
            (Some(record), Some(value)) => {
                unit.update_value(&record, value, now).await?;
            }
            (None, Some(value)) => {
                insert_or_update(&unit, voter_id, target, value, now).await?;
            }
            (None, None) => {}
        }

        let net_score = unit.sum_values(target).await?;
        unit.commit().await?;

        debug!(
            %voter_id,
            %target,
            from = ?transition.from,
            to = ?transition.to,
            self_loop = transition.is_self_loop(),
            "Vote transition"
        );
        info!(
            %voter_id,
            %target,
            value = request.as_i16(),
            net_score,
            "Vote recorded"
        );

        Ok(VoteOutcome {
            net_score,
            caller_vote: request.as_i16(),
        })
    }
}

/// Inserts a record, retrying once as an update if a concurrent writer got
/// there first.
async fn insert_or_update<U: VoteRepository>(
    unit: &U,
    voter_id: UserId,
    target: VoteTarget,
    value: VoteValue,
    now: DateTime<Utc>,
) -> Result<VoteRecord, VoteError> {
    match unit.insert(voter_id, target, value, now).await {
        Err(VoteError::DuplicateVote { .. }) => {
            warn!(%voter_id, %target, "Concurrent first vote, retrying as update");
            match unit.find(voter_id, target).await? {
                Some(record) => unit.update_value(&record, value, now).await,
                None => Err(VoteError::DuplicateVote { voter_id, target }),
            }
        }
        other => other,
    }
}

//! Read-only aggregate for display.

use std::collections::HashMap;

use agora_shared::types::UserId;
use uuid::Uuid;

use super::error::VoteError;
use super::ledger::VoteLedger;
use super::repository::{VoteRepository, VoteStore};
use super::types::{TargetKind, VoteTarget, VoteView};

impl<S: VoteStore> VoteLedger<S> {
    /// Score of `target` and the viewer's own vote, if any.
    ///
    /// Takes no per-key lock. The two reads are not a snapshot, so under
    /// concurrent casts `net_score` may already include or still exclude the
    /// viewer's latest vote. An unknown target reads as score 0.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` on store failure or timeout.
    pub async fn describe_for_viewer(
        &self,
        target: VoteTarget,
        viewer: Option<UserId>,
    ) -> Result<VoteView, VoteError> {
        let store = self.store();
        let work = async {
            let net_score = store.sum_values(target).await?;
            let viewer_vote = match viewer {
                Some(voter_id) => store
                    .find(voter_id, target)
                    .await?
                    .map_or(0, |record| record.value.as_i16()),
                None => 0,
            };
            Ok::<_, VoteError>(VoteView {
                net_score,
                viewer_vote,
            })
        };

        tokio::time::timeout(self.storage_timeout(), work)
            .await
            .map_err(|_| self.timed_out())?
    }

    /// Views of several targets of one kind, such as every reply in a
    /// thread, read with one aggregate query and one lookup of the viewer's
    /// votes under a single timeout.
    ///
    /// The result has an entry for every id in `ids`.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` on store failure or timeout.
    pub async fn describe_many_for_viewer(
        &self,
        kind: TargetKind,
        ids: &[Uuid],
        viewer: Option<UserId>,
    ) -> Result<HashMap<Uuid, VoteView>, VoteError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let store = self.store();
        let work = async {
            let scores = store.sum_values_by_target(kind, ids).await?;
            let own = match viewer {
                Some(voter_id) => store.find_by_voter(voter_id, kind, ids).await?,
                None => HashMap::new(),
            };
            Ok::<_, VoteError>(
                ids.iter()
                    .map(|id| {
                        let view = VoteView {
                            net_score: scores.get(id).copied().unwrap_or(0),
                            viewer_vote: own.get(id).map_or(0, |value| value.as_i16()),
                        };
                        (*id, view)
                    })
                    .collect(),
            )
        };

        tokio::time::timeout(self.storage_timeout(), work)
            .await
            .map_err(|_| self.timed_out())?
    }
}

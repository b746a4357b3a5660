//! Vote ledger.
//!
//! Each voter holds at most one vote per post or reply. A cast names the end
//! state (`1`, `-1` or `0`), so repeating it changes nothing, and scores are
//! always the sum of the stored votes rather than a maintained counter.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use agora_core::voting::{InMemoryVoteStore, VoteLedger, VoteTarget, DEFAULT_STORAGE_TIMEOUT};
//! use agora_shared::types::{PostId, UserId};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = Arc::new(InMemoryVoteStore::new());
//! let post = VoteTarget::post(PostId::new());
//! store.add_target(post);
//!
//! let ledger = VoteLedger::new(store, DEFAULT_STORAGE_TIMEOUT);
//! let outcome = ledger.cast_vote(UserId::new(), post, 1).await.unwrap();
//! assert_eq!(outcome.net_score, 1);
//! # });
//! ```

mod error;
mod ledger;
mod locks;
mod memory;
mod repository;
mod types;
mod view;


pub use error::VoteError;
pub use ledger::{DEFAULT_STORAGE_TIMEOUT, VoteLedger};
pub use locks::{KeyGuard, KeyLocks, VoteKey};
pub use memory::{Fault, InMemoryUnit, InMemoryVoteStore};
pub use repository::{VoteRepository, VoteStore, VoteUnitOfWork};
pub use types::{
    RequestedVote, TargetKind, VoteOutcome, VoteRecord, VoteState, VoteTarget, VoteTransition,
    VoteValue, VoteView,
};

//! Vote ledger data types.

use std::fmt;

use agora_shared::types::{PostId, ReplyId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::VoteError;

/// The kind of content a vote is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A top-level post.
    Post,
    /// A reply to a post.
    Reply,
}

impl TargetKind {
    /// Returns the lowercase name used in storage and API payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Reply => "reply",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A votable piece of content: the kind discriminates the id namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteTarget {
    /// Target kind.
    pub kind: TargetKind,
    /// Post or reply ID.
    pub id: Uuid,
}

impl VoteTarget {
    /// Creates a target from its parts.
    #[must_use]
    pub const fn new(kind: TargetKind, id: Uuid) -> Self {
        Self { kind, id }
    }

    /// Targets a post.
    #[must_use]
    pub const fn post(id: PostId) -> Self {
        Self::new(TargetKind::Post, id.into_inner())
    }

    /// Targets a reply.
    #[must_use]
    pub const fn reply(id: ReplyId) -> Self {
        Self::new(TargetKind::Reply, id.into_inner())
    }
}

impl From<PostId> for VoteTarget {
    fn from(id: PostId) -> Self {
        Self::post(id)
    }
}

impl From<ReplyId> for VoteTarget {
    fn from(id: ReplyId) -> Self {
        Self::reply(id)
    }
}

impl fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Direction of a stored vote. A stored vote is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteValue {
    /// +1
    Up,
    /// -1
    Down,
}

impl VoteValue {
    /// Signed unit magnitude of the vote.
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    /// Returns the opposite direction.
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }
}

impl TryFrom<i16> for VoteValue {
    type Error = VoteError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(VoteError::invalid_value(other)),
        }
    }
}

/// The end state a voter asks for.
///
/// Clients always send the state they want, never a delta, so repeating a
/// request converges on the same ledger contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedVote {
    /// Hold an upvote.
    Up,
    /// Hold a downvote.
    Down,
    /// Hold no vote.
    Retract,
}

impl RequestedVote {
    /// Parses the wire value `1`, `-1` or `0`.
    ///
    /// # Errors
    ///
    /// Returns `VoteError::InvalidValue` for anything else.
    pub fn from_value(value: i64) -> Result<Self, VoteError> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            0 => Ok(Self::Retract),
            other => Err(VoteError::invalid_value(other)),
        }
    }

    /// The value to store, or `None` when the record should not exist.
    #[must_use]
    pub const fn stored_value(self) -> Option<VoteValue> {
        match self {
            Self::Up => Some(VoteValue::Up),
            Self::Down => Some(VoteValue::Down),
            Self::Retract => None,
        }
    }

    /// Wire value of the request.
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        match self.stored_value() {
            Some(value) => value.as_i16(),
            None => 0,
        }
    }
}

/// One voter's vote on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// User who cast the vote.
    pub voter_id: UserId,
    /// Post or reply voted on.
    pub target: VoteTarget,
    /// Stored direction.
    pub value: VoteValue,
    /// Creation or last update timestamp.
    pub cast_at: DateTime<Utc>,
}

/// Per voter-target state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteState {
    /// No record exists.
    NoVote,
    /// Record with value +1.
    Upvoted,
    /// Record with value -1.
    Downvoted,
}

impl VoteState {
    /// State implied by an optional stored record.
    #[must_use]
    pub fn of(record: Option<&VoteRecord>) -> Self {
        match record.map(|r| r.value) {
            None => Self::NoVote,
            Some(VoteValue::Up) => Self::Upvoted,
            Some(VoteValue::Down) => Self::Downvoted,
        }
    }

    /// Every state moves to the requested one.
    #[must_use]
    pub const fn apply(self, request: RequestedVote) -> VoteTransition {
        let to = match request {
            RequestedVote::Up => Self::Upvoted,
            RequestedVote::Down => Self::Downvoted,
            RequestedVote::Retract => Self::NoVote,
        };
        VoteTransition { from: self, to }
    }
}

/// A single edge of the vote state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTransition {
    /// State before the cast.
    pub from: VoteState,
    /// State after the cast.
    pub to: VoteState,
}

impl VoteTransition {
    /// True when the request restates the current state.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// Result of a vote cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    /// Sum of every stored vote on the target after the cast.
    pub net_score: i64,
    /// The caller's vote after the cast: 1, -1 or 0.
    pub caller_vote: i16,
}

/// Aggregate shown to a (possibly anonymous) viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteView {
    /// Sum of every stored vote on the target.
    pub net_score: i64,
    /// The viewer's own vote: 1, -1 or 0.
    pub viewer_vote: i16,
}

//! Vote ledger error types.

use agora_shared::AppError;
use agora_shared::types::UserId;
use thiserror::Error;

use super::types::VoteTarget;

/// Errors returned by the vote ledger.
#[derive(Debug, Error)]
pub enum VoteError {
    /// Requested value is not 1, -1 or 0. Holds the value as received.
    #[error("Invalid vote value {0}: expected 1, -1 or 0")]
    InvalidValue(String),

    /// The post or reply does not exist.
    #[error("{} not found: {}", .0.kind, .0.id)]
    TargetNotFound(VoteTarget),

    /// A record already exists for the voter and target.
    ///
    /// The ledger retries this once as an update; it only escapes when the
    /// retry could not find the conflicting record either.
    #[error("Conflicting vote by {voter_id} on {target}")]
    DuplicateVote {
        /// Voter.
        voter_id: UserId,
        /// Target.
        target: VoteTarget,
    },

    /// The voter is not a registered user.
    #[error("Unknown voter {0}")]
    UnknownVoter(UserId),

    /// The backing store could not be reached or did not answer in time.
    #[error("Vote storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The store answered with something the ledger cannot interpret.
    #[error("Vote ledger error: {0}")]
    Internal(String),
}

impl VoteError {
    /// Create an invalid value error from the value as received.
    #[must_use]
    pub fn invalid_value(raw: impl ToString) -> Self {
        Self::InvalidValue(raw.to_string())
    }

    /// Create a storage unavailable error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidValue(_) => "INVALID_VOTE_VALUE",
            Self::TargetNotFound(_) => "TARGET_NOT_FOUND",
            Self::DuplicateVote { .. } => "DUPLICATE_VOTE",
            Self::UnknownVoter(_) => "UNKNOWN_VOTER",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<VoteError> for AppError {
    fn from(err: VoteError) -> Self {
        let message = err.to_string();
        match err {
            VoteError::InvalidValue(_) => Self::Validation(message),
            VoteError::TargetNotFound(_) => Self::NotFound(message),
            VoteError::DuplicateVote { .. } => Self::Conflict(message),
            VoteError::UnknownVoter(_) => Self::Unauthorized(message),
            VoteError::StorageUnavailable(_) => Self::ServiceUnavailable(message),
            VoteError::Internal(_) => Self::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voting::types::TargetKind;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let target = VoteTarget::new(TargetKind::Post, Uuid::new_v4());

        assert_eq!(AppError::from(VoteError::invalid_value(2)).status_code(), 400);
        assert_eq!(
            AppError::from(VoteError::TargetNotFound(target)).status_code(),
            404
        );
        assert_eq!(
            AppError::from(VoteError::DuplicateVote {
                voter_id: UserId::new(),
                target,
            })
            .status_code(),
            409
        );
        assert_eq!(
            AppError::from(VoteError::UnknownVoter(UserId::new())).status_code(),
            401
        );
        assert_eq!(
            AppError::from(VoteError::storage("pool timed out")).status_code(),
            503
        );
        assert_eq!(
            AppError::from(VoteError::internal("bad row")).status_code(),
            500
        );
    }

    #[test]
    fn test_invalid_value_keeps_raw_text() {
        let err = VoteError::invalid_value(1.5);

        assert_eq!(err.to_string(), "Invalid vote value 1.5: expected 1, -1 or 0");
        assert_eq!(err.error_code(), "INVALID_VOTE_VALUE");
    }

    #[test]
    fn test_target_not_found_message_names_kind() {
        let id = Uuid::new_v4();
        let err = VoteError::TargetNotFound(VoteTarget::new(TargetKind::Reply, id));

        assert_eq!(err.to_string(), format!("reply not found: {id}"));
        assert_eq!(err.error_code(), "TARGET_NOT_FOUND");
    }
}

//! Vote routes.
//!
//! The body names the caller's desired vote (`1`, `-1` or `0`); repeating a
//! request is harmless. The response is the updated post or reply.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    routing::post,
};
use serde::Deserialize;
use tracing::info;

use agora_core::voting::{RequestedVote, VoteError, VoteTarget};
use agora_db::ForumRepository;
use agora_shared::types::{PostId, ReplyId};

use super::posts::{PostResponse, ReplyResponse};
use crate::{AppState, error::ApiError, middleware::AuthUser};

/// Creates the vote routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/posts/{post_id}/vote", post(vote_post))
        .route("/replies/{reply_id}/vote", post(vote_reply))
}

/// Request body for casting a vote.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    /// 1 to upvote, -1 to downvote, 0 to retract.
    ///
    /// Kept as raw JSON so that strings, fractions and out-of-range numbers
    /// are reported as invalid vote values.
    #[serde(default)]
    pub value: serde_json::Value,
}

impl VoteRequest {
    /// The requested value, once it is known to be 1, -1 or 0.
    fn requested_value(&self) -> Result<i64, VoteError> {
        let value = self
            .value
            .as_i64()
            .ok_or_else(|| VoteError::invalid_value(&self.value))?;
        RequestedVote::from_value(value)?;
        Ok(value)
    }
}

/// Vote on a post.
async fn vote_post(
    State(state): State<AppState>,
    user: AuthUser,
    Path(post_id): Path<PostId>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<PostResponse>, ApiError> {
    let Json(request) = payload?;
    let value = request.requested_value()?;

    // Everything the response needs is read before the vote commits.
    let post = ForumRepository::new(state.db.as_ref().clone())
        .find_post(post_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("post {post_id}")))?;

    let outcome = state
        .ledger
        .cast_vote(user.user_id(), VoteTarget::post(post_id), value)
        .await?;

    info!(user = user.username(), %post_id, value, "Post vote cast");

    Ok(Json(PostResponse::new(
        post,
        outcome.net_score,
        Some(outcome.caller_vote),
    )))
}

/// Vote on a reply.
async fn vote_reply(
    State(state): State<AppState>,
    user: AuthUser,
    Path(reply_id): Path<ReplyId>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<ReplyResponse>, ApiError> {
    let Json(request) = payload?;
    let value = request.requested_value()?;

    let reply = ForumRepository::new(state.db.as_ref().clone())
        .find_reply(reply_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("reply {reply_id}")))?;

    let outcome = state
        .ledger
        .cast_vote(user.user_id(), VoteTarget::reply(reply_id), value)
        .await?;

    info!(user = user.username(), %reply_id, value, "Reply vote cast");

    Ok(Json(ReplyResponse::new(
        reply,
        outcome.net_score,
        Some(outcome.caller_vote),
    )))
}

//! Post and reply read routes.
//!
//! Scores are read from the vote ledger on every request. `user_vote` is
//! only present when the request is authenticated.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Serialize;
use uuid::Uuid;

use agora_core::voting::{TargetKind, VoteTarget, VoteView};
use agora_db::ForumRepository;
use agora_db::entities::{posts, replies};
use agora_shared::types::{PostId, ReplyId, UserId};

use crate::{AppState, error::ApiError, middleware::OptionalAuthUser};

/// Creates the post and reply routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/posts/{post_id}", get(get_post))
        .route("/replies/{reply_id}", get(get_reply))
}

// ============================================================================
// Response Types
// ============================================================================

/// A post with its score.
#[derive(Debug, Serialize)]
pub struct PostResponse {
    /// Post ID.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Author user ID.
    pub author_id: Uuid,
    /// Category ID.
    pub category_id: Uuid,
    /// Created at timestamp (ISO 8601).
    pub created_at: String,
    /// Net score.
    pub vote_count: i64,
    /// The caller's vote: 1, -1 or 0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_vote: Option<i16>,
    /// Replies, oldest first, when the whole thread was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies: Option<Vec<ReplyResponse>>,
}

/// A reply with its score.
#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    /// Reply ID.
    pub id: Uuid,
    /// Parent post ID.
    pub post_id: Uuid,
    /// Author user ID.
    pub author_id: Uuid,
    /// Body text.
    pub content: String,
    /// Created at timestamp (ISO 8601).
    pub created_at: String,
    /// Net score.
    pub vote_count: i64,
    /// The caller's vote: 1, -1 or 0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_vote: Option<i16>,
}

impl PostResponse {
    /// Builds the representation from a row and its score.
    #[must_use]
    pub fn new(model: posts::Model, vote_count: i64, user_vote: Option<i16>) -> Self {
        Self {
            id: model.id,
            title: model.title,
            content: model.content,
            author_id: model.author_id,
            category_id: model.category_id,
            created_at: model.created_at.to_rfc3339(),
            vote_count,
            user_vote,
            replies: None,
        }
    }
}

impl ReplyResponse {
    /// Builds the representation from a row and its score.
    #[must_use]
    pub fn new(model: replies::Model, vote_count: i64, user_vote: Option<i16>) -> Self {
        Self {
            id: model.id,
            post_id: model.post_id,
            author_id: model.author_id,
            content: model.content,
            created_at: model.created_at.to_rfc3339(),
            vote_count,
            user_vote,
        }
    }
}

/// `viewer_vote` is only disclosed to an identified viewer.
fn disclosed(view: VoteView, viewer: Option<UserId>) -> Option<i16> {
    viewer.map(|_| view.viewer_vote)
}

// ============================================================================
// Handlers
// ============================================================================

/// Get a post with its replies.
async fn get_post(
    viewer: OptionalAuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
) -> Result<Json<PostResponse>, ApiError> {
    let forum = ForumRepository::new(state.db.as_ref().clone());
    let viewer = viewer.user_id();

    let post = forum
        .find_post(post_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("post {post_id}")))?;

    let view = state
        .ledger
        .describe_for_viewer(VoteTarget::post(post_id), viewer)
        .await?;

    let rows = forum.list_replies(post_id).await?;
    let reply_ids: Vec<Uuid> = rows.iter().map(|reply| reply.id).collect();
    let mut reply_views = state
        .ledger
        .describe_many_for_viewer(TargetKind::Reply, &reply_ids, viewer)
        .await?;

    let replies = rows
        .into_iter()
        .map(|reply| {
            let reply_view = reply_views.remove(&reply.id).unwrap_or_default();
            ReplyResponse::new(
                reply,
                reply_view.net_score,
                disclosed(reply_view, viewer),
            )
        })
        .collect();

    let mut response = PostResponse::new(post, view.net_score, disclosed(view, viewer));
    response.replies = Some(replies);
    Ok(Json(response))
}

/// Get a single reply.
async fn get_reply(
    viewer: OptionalAuthUser,
    State(state): State<AppState>,
    Path(reply_id): Path<ReplyId>,
) -> Result<Json<ReplyResponse>, ApiError> {
    let forum = ForumRepository::new(state.db.as_ref().clone());
    let viewer = viewer.user_id();

    let reply = forum
        .find_reply(reply_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("reply {reply_id}")))?;

    let view = state
        .ledger
        .describe_for_viewer(VoteTarget::reply(reply_id), viewer)
        .await?;

    Ok(Json(ReplyResponse::new(
        reply,
        view.net_score,
        disclosed(view, viewer),
    )))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::http::StatusCode;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, Value};
    use uuid::Uuid;

    use agora_db::entities::{posts, replies};

    use crate::test_support::{offline_state, send, state_with, token};

    #[tokio::test]
    async fn test_get_post_scores_every_reply_in_one_read() {
        let post_id = Uuid::new_v4();
        let author_id = Uuid::new_v4();
        let now = Utc::now().into();
        let post = posts::Model {
            id: post_id,
            title: "Welcome".to_string(),
            content: "Say hello".to_string(),
            author_id,
            category_id: Uuid::new_v4(),
            created_at: now,
        };
        let thread: Vec<replies::Model> = (0..3)
            .map(|_| replies::Model {
                id: Uuid::new_v4(),
                post_id,
                author_id,
                content: "hello".to_string(),
                created_at: now,
            })
            .collect();
        let scored = thread[0].id;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![post]])
            .append_query_results([vec![BTreeMap::from([("total", Value::from(Some(3i64)))])]])
            .append_query_results([thread])
            .append_query_results([vec![BTreeMap::from([
                ("target_id", Value::from(scored)),
                ("total", Value::from(Some(-2i64))),
            ])]])
            .into_connection();

        let uri = format!("/api/v1/posts/{post_id}");
        let (response, body) = send(state_with(db.clone()), "GET", &uri, None, None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body["vote_count"], 3);
        assert!(body.get("user_vote").is_none());
        let listed = body["replies"].as_array().unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0]["vote_count"], -2);
        assert_eq!(listed[1]["vote_count"], 0);
        assert_eq!(listed[2]["vote_count"], 0);
        // Post lookup, post score, reply list, one grouped reply score.
        assert_eq!(db.into_transaction_log().len(), 4);
    }

    #[tokio::test]
    async fn test_get_post_storage_down_returns_503() {
        let state = offline_state();
        let uri = format!("/api/v1/posts/{}", Uuid::new_v4());

        let (response, body) = send(state, "GET", &uri, None, None).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "storage_unavailable");
    }

    #[tokio::test]
    async fn test_get_reply_with_bad_token_returns_401() {
        let state = offline_state();
        let uri = format!("/api/v1/replies/{}", Uuid::new_v4());

        let (response, body) = send(state, "GET", &uri, Some("not-a-jwt"), None).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_get_reply_with_valid_token_reaches_storage() {
        let state = offline_state();
        let token = token(&state);
        let uri = format!("/api/v1/replies/{}", Uuid::new_v4());

        let (response, _) = send(state, "GET", &uri, Some(&token), None).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_get_post_bad_id_returns_400() {
        let (response, _) = send(offline_state(), "GET", "/api/v1/posts/42", None, None).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

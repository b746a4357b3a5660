//! Integration tests for the `PostgreSQL` vote ledger.
//!
//! Run with a migrated-or-empty database:
//! `DATABASE_URL=postgres://... cargo test -p agora-db -- --ignored`

mod common;

use std::sync::Arc;
use std::time::Duration;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, SqlErr};

use agora_core::voting::{
    DEFAULT_STORAGE_TIMEOUT, VoteError, VoteLedger, VoteOutcome, VoteRepository as _, VoteStore,
    VoteTarget, VoteUnitOfWork, VoteValue, VoteView,
};
use agora_db::entities::votes;
use agora_db::{ForumRepository, VoteRepository};
use agora_shared::types::{PostId, UserId};

use common::{create_thread, create_user, setup};

fn ledger(db: &sea_orm::DatabaseConnection) -> VoteLedger<VoteRepository> {
    VoteLedger::new(
        Arc::new(VoteRepository::new(db.clone())),
        DEFAULT_STORAGE_TIMEOUT,
    )
}

async fn row_count(db: &sea_orm::DatabaseConnection, target: VoteTarget) -> u64 {
    votes::Entity::find()
        .filter(votes::Column::TargetId.eq(target.id))
        .count(db)
        .await
        .expect("Failed to count votes")
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_up_down_retract_on_post() {
    let db = setup().await;
    let forum = ForumRepository::new(db.clone());
    let thread = create_thread(&forum).await;
    let voter = create_user(&forum).await;
    let ledger = ledger(&db);
    let target = VoteTarget::post(thread.post);

    let up = ledger.cast_vote(voter, target, 1).await.unwrap();
    assert_eq!(up, VoteOutcome { net_score: 1, caller_vote: 1 });

    let down = ledger.cast_vote(voter, target, -1).await.unwrap();
    assert_eq!(down, VoteOutcome { net_score: -1, caller_vote: -1 });

    let retract = ledger.cast_vote(voter, target, 0).await.unwrap();
    assert_eq!(retract, VoteOutcome { net_score: 0, caller_vote: 0 });
    assert_eq!(row_count(&db, target).await, 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_two_voters_and_describe() {
    let db = setup().await;
    let forum = ForumRepository::new(db.clone());
    let thread = create_thread(&forum).await;
    let v1 = create_user(&forum).await;
    let v2 = create_user(&forum).await;
    let ledger = ledger(&db);
    let target = VoteTarget::reply(thread.reply);

    ledger.cast_vote(v1, target, 1).await.unwrap();
    let both = ledger.cast_vote(v2, target, 1).await.unwrap();
    assert_eq!(both.net_score, 2);
    let flipped = ledger.cast_vote(v2, target, -1).await.unwrap();
    assert_eq!(flipped.net_score, 0);

    let view = ledger.describe_for_viewer(target, Some(v2)).await.unwrap();
    assert_eq!(view, VoteView { net_score: 0, viewer_vote: -1 });
    let anonymous = ledger.describe_for_viewer(target, None).await.unwrap();
    assert_eq!(anonymous.viewer_vote, 0);

    // The reply's votes never leak into the post's score.
    let post_view = ledger
        .describe_for_viewer(VoteTarget::post(thread.post), Some(v1))
        .await
        .unwrap();
    assert_eq!(post_view, VoteView { net_score: 0, viewer_vote: 0 });
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_missing_target() {
    let db = setup().await;
    let forum = ForumRepository::new(db.clone());
    let voter = create_user(&forum).await;
    let ghost = VoteTarget::post(PostId::new());

    let result = ledger(&db).cast_vote(voter, ghost, 1).await;

    assert!(matches!(result, Err(VoteError::TargetNotFound(t)) if t == ghost));
    assert_eq!(row_count(&db, ghost).await, 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_uncommitted_unit_leaves_no_rows() {
    let db = setup().await;
    let forum = ForumRepository::new(db.clone());
    let thread = create_thread(&forum).await;
    let voter = create_user(&forum).await;
    let store = VoteRepository::new(db.clone());
    let target = VoteTarget::post(thread.post);

    {
        let unit = store.begin().await.unwrap();
        unit.insert(voter, target, VoteValue::Up, chrono::Utc::now())
            .await
            .unwrap();
        assert_eq!(unit.sum_values(target).await.unwrap(), 1);
    }

    assert_eq!(store.sum_values(target).await.unwrap(), 0);
    assert_eq!(row_count(&db, target).await, 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_insert_reported_without_aborting_unit() {
    let db = setup().await;
    let forum = ForumRepository::new(db.clone());
    let thread = create_thread(&forum).await;
    let voter = create_user(&forum).await;
    let store = VoteRepository::new(db.clone());
    let target = VoteTarget::post(thread.post);
    let now = chrono::Utc::now();

    let unit = store.begin().await.unwrap();
    unit.insert(voter, target, VoteValue::Up, now).await.unwrap();
    let second = unit.insert(voter, target, VoteValue::Down, now).await;
    assert!(matches!(second, Err(VoteError::DuplicateVote { .. })));

    // Still usable after the conflict.
    let record = unit.find(voter, target).await.unwrap().unwrap();
    unit.update_value(&record, VoteValue::Down, now).await.unwrap();
    unit.commit().await.unwrap();

    assert_eq!(store.sum_values(target).await.unwrap(), -1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_deleting_post_removes_its_votes() {
    let db = setup().await;
    let forum = ForumRepository::new(db.clone());
    let thread = create_thread(&forum).await;
    let voter = create_user(&forum).await;
    let ledger = ledger(&db);
    let post = VoteTarget::post(thread.post);
    let reply = VoteTarget::reply(thread.reply);

    ledger.cast_vote(voter, post, 1).await.unwrap();
    ledger.cast_vote(voter, reply, -1).await.unwrap();
    ledger.cast_vote(thread.author, reply, -1).await.unwrap();

    assert!(forum.delete_post(thread.post).await.unwrap());

    assert_eq!(row_count(&db, post).await, 0);
    assert_eq!(row_count(&db, reply).await, 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_unknown_voter_is_rejected() {
    let db = setup().await;
    let forum = ForumRepository::new(db.clone());
    let thread = create_thread(&forum).await;
    let target = VoteTarget::post(thread.post);
    let stranger = UserId::new();

    // The voter foreign key rejects users that do not exist.
    let result = ledger(&db).cast_vote(stranger, target, 1).await;

    assert!(matches!(result, Err(VoteError::UnknownVoter(id)) if id == stranger));
    assert_eq!(row_count(&db, target).await, 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_target_delete_waits_for_open_unit() {
    let db = setup().await;
    let forum = ForumRepository::new(db.clone());
    let thread = create_thread(&forum).await;
    let voter = create_user(&forum).await;
    let store = VoteRepository::new(db.clone());
    let target = VoteTarget::post(thread.post);

    let unit = store.begin().await.unwrap();
    assert!(unit.exists_target(target).await.unwrap());

    let deleter = forum.clone();
    let post = thread.post;
    let delete = tokio::spawn(async move { deleter.delete_post(post).await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!delete.is_finished(), "delete must wait for the unit");

    unit.insert(voter, target, VoteValue::Up, chrono::Utc::now())
        .await
        .unwrap();
    unit.commit().await.unwrap();

    assert!(delete.await.unwrap().unwrap());
    assert_eq!(row_count(&db, target).await, 0);
    assert_eq!(store.sum_values(target).await.unwrap(), 0);
}

fn raw_insert(voter: UserId, post: PostId, value: i32) -> String {
    format!(
        "INSERT INTO votes (voter_id, target_kind, target_id, value) \
         VALUES ('{voter}', 'post', '{post}', {value})"
    )
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_schema_rejects_values_outside_up_down() {
    let db = setup().await;
    let forum = ForumRepository::new(db.clone());
    let thread = create_thread(&forum).await;
    let voter = create_user(&forum).await;

    for value in [0, 2, -2] {
        let err = db
            .execute_unprepared(&raw_insert(voter, thread.post, value))
            .await
            .expect_err("value outside -1/1 must be rejected");
        assert!(err.to_string().contains("chk_vote_value"), "{value}: {err}");
    }

    assert_eq!(row_count(&db, VoteTarget::post(thread.post)).await, 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_schema_rejects_second_record_for_key() {
    let db = setup().await;
    let forum = ForumRepository::new(db.clone());
    let thread = create_thread(&forum).await;
    let voter = create_user(&forum).await;

    db.execute_unprepared(&raw_insert(voter, thread.post, 1))
        .await
        .unwrap();
    let err = db
        .execute_unprepared(&raw_insert(voter, thread.post, -1))
        .await
        .expect_err("second record for the same key must be rejected");

    assert!(matches!(
        err.sql_err(),
        Some(SqlErr::UniqueConstraintViolation(_))
    ));
    let target = VoteTarget::post(thread.post);
    assert_eq!(row_count(&db, target).await, 1);
    assert_eq!(VoteRepository::new(db.clone()).sum_values(target).await.unwrap(), 1);
}

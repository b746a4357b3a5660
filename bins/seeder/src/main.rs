//! Database seeder for Agora development and testing.
//!
//! Seeds the default categories, two demo users and a welcome thread with a
//! vote on it. Safe to run repeatedly.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use agora_core::voting::{DEFAULT_STORAGE_TIMEOUT, VoteLedger, VoteTarget};
use agora_db::entities::posts;
use agora_db::{ForumRepository, VoteRepository};
use agora_shared::types::{CategoryId, PostId, UserId};

/// Categories every fresh install starts with.
const DEFAULT_CATEGORIES: [&str; 10] = [
    "Football",
    "Basketball",
    "Baseball",
    "Soccer",
    "Tennis",
    "Golf",
    "Hockey",
    "Rugby",
    "Cricket",
    "Swimming",
];

const DEMO_USERS: [&str; 2] = ["alice", "bob"];

const WELCOME_TITLE: &str = "Welcome to Agora";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("AGORA__DATABASE__URL"))
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set in environment"))?;

    println!("Connecting to database...");
    let db = agora_db::connect(&database_url).await?;
    let forum = ForumRepository::new(db.clone());

    println!("Seeding categories...");
    seed_categories(&forum).await?;

    println!("Seeding demo users...");
    let users = seed_users(&forum).await?;

    println!("Seeding welcome thread...");
    seed_welcome_thread(&db, &forum, &users).await?;

    println!("Seeding complete!");
    Ok(())
}

async fn seed_categories(forum: &ForumRepository) -> anyhow::Result<()> {
    for name in DEFAULT_CATEGORIES {
        forum.find_or_create_category(name).await?;
    }
    println!("  {} categories present", DEFAULT_CATEGORIES.len());
    Ok(())
}

async fn seed_users(forum: &ForumRepository) -> anyhow::Result<Vec<UserId>> {
    let mut ids = Vec::with_capacity(DEMO_USERS.len());
    for username in DEMO_USERS {
        let user = if let Some(existing) = forum.find_user_by_username(username).await? {
            println!("  User {username} already exists, skipping...");
            existing
        } else {
            println!("  Created user: {username}");
            forum.create_user(username).await?
        };
        ids.push(UserId::from_uuid(user.id));
    }
    Ok(ids)
}

async fn seed_welcome_thread(
    db: &DatabaseConnection,
    forum: &ForumRepository,
    users: &[UserId],
) -> anyhow::Result<()> {
    let [author, voter] = users else {
        anyhow::bail!("expected {} demo users", DEMO_USERS.len());
    };

    if posts::Entity::find()
        .filter(posts::Column::Title.eq(WELCOME_TITLE))
        .one(db)
        .await?
        .is_some()
    {
        println!("  Welcome thread already exists, skipping...");
        return Ok(());
    }

    let category = forum.find_or_create_category(DEFAULT_CATEGORIES[0]).await?;
    let post = forum
        .create_post(
            *author,
            CategoryId::from_uuid(category.id),
            WELCOME_TITLE,
            "Introduce yourself and tell us which team you follow.",
        )
        .await?;
    let post_id = PostId::from_uuid(post.id);
    forum
        .create_reply(post_id, *voter, "Hello from the other side of the pitch!")
        .await?;

    let ledger = VoteLedger::new(
        Arc::new(VoteRepository::new(db.clone())),
        DEFAULT_STORAGE_TIMEOUT,
    );
    let outcome = ledger
        .cast_vote(*voter, VoteTarget::post(post_id), 1)
        .await?;

    println!(
        "  Created welcome thread {post_id} (score {})",
        outcome.net_score
    );
    Ok(())
}

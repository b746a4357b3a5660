//! Vote ledger.
//!
//! One table for both posts and replies, keyed by
//! `(voter_id, target_kind, target_id)`. Because `target_id` points at one of
//! two tables it carries no foreign key; triggers on `posts` and `replies`
//! remove the rows instead.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(ENUMS_SQL).await?;
        db.execute_unprepared(VOTES_SQL).await?;
        db.execute_unprepared(TRIGGERS_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const ENUMS_SQL: &str = r"
CREATE TYPE vote_target_kind AS ENUM ('post', 'reply');
";

const VOTES_SQL: &str = r"
CREATE TABLE votes (
    voter_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    target_kind vote_target_kind NOT NULL,
    target_id UUID NOT NULL,
    value SMALLINT NOT NULL,
    cast_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (voter_id, target_kind, target_id),
    CONSTRAINT chk_vote_value CHECK (value IN (-1, 1))
);

-- Score aggregation per target
CREATE INDEX idx_votes_target ON votes(target_kind, target_id) INCLUDE (value);
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: delete_post_votes
-- Removes ledger rows of a deleted post
-- ============================================================
CREATE OR REPLACE FUNCTION delete_post_votes()
RETURNS TRIGGER AS $$
BEGIN
    DELETE FROM votes
    WHERE target_kind = 'post' AND target_id = OLD.id;
    RETURN OLD;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_delete_post_votes
AFTER DELETE ON posts
FOR EACH ROW
EXECUTE FUNCTION delete_post_votes();

-- ============================================================
-- FUNCTION: delete_reply_votes
-- Removes ledger rows of a deleted reply, including replies
-- removed by a post cascade
-- ============================================================
CREATE OR REPLACE FUNCTION delete_reply_votes()
RETURNS TRIGGER AS $$
BEGIN
    DELETE FROM votes
    WHERE target_kind = 'reply' AND target_id = OLD.id;
    RETURN OLD;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_delete_reply_votes
AFTER DELETE ON replies
FOR EACH ROW
EXECUTE FUNCTION delete_reply_votes();
";

const DROP_ALL_SQL: &str = r"
DROP TRIGGER IF EXISTS trg_delete_reply_votes ON replies;
DROP TRIGGER IF EXISTS trg_delete_post_votes ON posts;
DROP FUNCTION IF EXISTS delete_reply_votes();
DROP FUNCTION IF EXISTS delete_post_votes();
DROP TABLE IF EXISTS votes CASCADE;
DROP TYPE IF EXISTS vote_target_kind;
";

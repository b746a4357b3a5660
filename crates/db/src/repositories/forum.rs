//! Forum content repository.
//!
//! Posts, replies, categories and users are plain CRUD; scores are never
//! stored here and come from the vote ledger instead.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};

use agora_shared::types::{CategoryId, PostId, ReplyId, UserId};

use crate::entities::{categories, posts, replies, users};

/// Forum repository for posts, replies and their owners.
#[derive(Debug, Clone)]
pub struct ForumRepository {
    db: DatabaseConnection,
}

impl ForumRepository {
    /// Creates a new forum repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds a post by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_post(&self, id: PostId) -> Result<Option<posts::Model>, DbErr> {
        posts::Entity::find_by_id(id.into_inner()).one(&self.db).await
    }

    /// Finds a reply by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_reply(&self, id: ReplyId) -> Result<Option<replies::Model>, DbErr> {
        replies::Entity::find_by_id(id.into_inner()).one(&self.db).await
    }

    /// Lists a post's replies, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_replies(&self, post_id: PostId) -> Result<Vec<replies::Model>, DbErr> {
        replies::Entity::find()
            .filter(replies::Column::PostId.eq(post_id.into_inner()))
            .order_by_asc(replies::Column::CreatedAt)
            .order_by_asc(replies::Column::Id)
            .all(&self.db)
            .await
    }

    /// Finds a user by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<users::Model>, DbErr> {
        users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.db)
            .await
    }

    /// Creates a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, e.g. on a taken username.
    pub async fn create_user(&self, username: &str) -> Result<users::Model, DbErr> {
        users::ActiveModel {
            id: Set(UserId::new().into_inner()),
            username: Set(username.to_string()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
    }

    /// Returns the category with `name`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_or_create_category(&self, name: &str) -> Result<categories::Model, DbErr> {
        if let Some(existing) = categories::Entity::find()
            .filter(categories::Column::Name.eq(name))
            .one(&self.db)
            .await?
        {
            return Ok(existing);
        }

        categories::ActiveModel {
            id: Set(CategoryId::new().into_inner()),
            name: Set(name.to_string()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
    }

    /// Creates a post.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_post(
        &self,
        author_id: UserId,
        category_id: CategoryId,
        title: &str,
        content: &str,
    ) -> Result<posts::Model, DbErr> {
        posts::ActiveModel {
            id: Set(PostId::new().into_inner()),
            title: Set(title.to_string()),
            content: Set(content.to_string()),
            author_id: Set(author_id.into_inner()),
            category_id: Set(category_id.into_inner()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
    }

    /// Creates a reply on a post.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, e.g. when the post is gone.
    pub async fn create_reply(
        &self,
        post_id: PostId,
        author_id: UserId,
        content: &str,
    ) -> Result<replies::Model, DbErr> {
        replies::ActiveModel {
            id: Set(ReplyId::new().into_inner()),
            post_id: Set(post_id.into_inner()),
            author_id: Set(author_id.into_inner()),
            content: Set(content.to_string()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
    }

    /// Deletes a post; its replies and all their votes go with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_post(&self, id: PostId) -> Result<bool, DbErr> {
        let result = posts::Entity::delete_by_id(id.into_inner())
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}


//! Post repository.

use std::sync::Arc;

use super::db_error;
use crate::entities::{Post, post};
use geofeed_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

/// Post repository for database operations.
#[derive(Clone)]
pub struct PostRepository {
    db: Arc<DatabaseConnection>,
}

impl PostRepository {
    /// Create a new post repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a post by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<post::Model>> {
        Post::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Create a new post.
    pub async fn create(&self, model: post::ActiveModel) -> AppResult<post::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_error)
    }

    /// Get posts authored by any of `author_ids`, newest first.
    ///
    /// # Arguments
    /// * `author_ids` - The viewer plus their accepted friends
    /// * `offset` - Number of posts to skip
    /// * `limit` - Maximum number of posts to return
    pub async fn find_by_authors(
        &self,
        author_ids: &[String],
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<post::Model>> {
        if author_ids.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        Post::find()
            .filter(post::Column::UserId.is_in(author_ids.to_vec()))
            .order_by_desc(post::Column::CreatedAt)
            .order_by_desc(post::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Delete a post owned by `user_id`.
    ///
    /// Reactions and comments cascade. A post that exists but belongs to
    /// someone else yields `Forbidden`.
    pub async fn delete_owned(&self, id: &str, user_id: &str) -> AppResult<()> {
        let result = Post::delete_many()
            .filter(post::Column::Id.eq(id))
            .filter(post::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_error)?;

        if result.rows_affected > 0 {
            return Ok(());
        }

        match self.find_by_id(id).await? {
            Some(_) => Err(AppError::Forbidden(
                "Only the author can delete a post".to_string(),
            )),
            None => Err(AppError::PostNotFound(id.to_string())),
        }
    }
}

//! Reaction repository.

use std::sync::Arc;

use super::db_error;
use crate::entities::{Reaction, reaction};
use geofeed_common::AppResult;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};

/// Reaction repository for database operations.
#[derive(Clone)]
pub struct ReactionRepository {
    db: Arc<DatabaseConnection>,
}

impl ReactionRepository {
    /// Create a new reaction repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Get all reactions on any of `post_ids` in a single query.
    pub async fn find_by_posts(&self, post_ids: &[String]) -> AppResult<Vec<reaction::Model>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }

        Reaction::find()
            .filter(reaction::Column::PostId.is_in(post_ids.to_vec()))
            .order_by_asc(reaction::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Create a new reaction.
    ///
    /// A second reaction by the same user on the same post surfaces as
    /// `Conflict`; a deleted post surfaces as `NotFound`.
    pub async fn create(&self, model: reaction::ActiveModel) -> AppResult<reaction::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_error)
    }

    /// Delete the reaction a user left on a post.
    ///
    /// Returns the number of rows removed (zero when there was none).
    pub async fn delete_by_user_and_post(&self, user_id: &str, post_id: &str) -> AppResult<u64> {
        let result = Reaction::delete_many()
            .filter(reaction::Column::UserId.eq(user_id))
            .filter(reaction::Column::PostId.eq(post_id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_reaction(id: &str, user_id: &str, post_id: &str, emoji: &str) -> reaction::Model {
        reaction::Model {
            id: id.to_string(),
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            emoji: emoji.to_string(),
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_posts() {
        let r1 = create_test_reaction("r1", "user1", "post1", "🔥");
        let r2 = create_test_reaction("r2", "user2", "post2", "❤️");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[r1, r2]])
                .into_connection(),
        );

        let repo = ReactionRepository::new(db);
        let result = repo
            .find_by_posts(&["post1".to_string(), "post2".to_string()])
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_find_by_posts_empty() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = ReactionRepository::new(db);
        assert!(repo.find_by_posts(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_user_and_post() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = ReactionRepository::new(db);
        let removed = repo.delete_by_user_and_post("user1", "post1").await.unwrap();

        assert_eq!(removed, 1);
    }
}

//! User repository.

use std::sync::Arc;

use super::db_error;
use crate::entities::{User, user};
use geofeed_common::AppResult;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Find users by IDs in a single query.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        User::find()
            .filter(user::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Create a new user. A taken username surfaces as `Conflict`.
    pub async fn create(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_error)
    }

    /// Update a user.
    pub async fn update(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model.update(self.db.as_ref()).await.map_err(db_error)
    }

    /// Search users by case-insensitive substring of username or display name.
    pub async fn search(
        &self,
        query: &str,
        exclude_id: Option<&str>,
        limit: u64,
    ) -> AppResult<Vec<user::Model>> {
        let pattern = format!(
            "%{}%",
            query
                .to_lowercase()
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_")
        );

        let mut condition = Condition::all().add(
            Condition::any()
                .add(user::Column::Username.like(&pattern))
                .add(
                    sea_orm::sea_query::Expr::expr(sea_orm::sea_query::Func::lower(
                        sea_orm::sea_query::Expr::col(user::Column::DisplayName),
                    ))
                    .like(&pattern),
                ),
        );

        if let Some(id) = exclude_id {
            condition = condition.add(user::Column::Id.ne(id));
        }

        User::find()
            .filter(condition)
            .order_by_asc(user::Column::Username)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)
    }
}

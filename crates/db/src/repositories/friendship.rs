//! Friendship edge repository.

use std::sync::Arc;

use super::db_error;
use crate::entities::{
    Friendship,
    friendship::{self, FriendshipStatus},
};
use geofeed_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
    sea_query::Expr,
};

/// Friendship repository for database operations.
#[derive(Clone)]
pub struct FriendshipRepository {
    db: Arc<DatabaseConnection>,
}

impl FriendshipRepository {
    /// Create a new friendship repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an edge by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<friendship::Model>> {
        Friendship::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Get every edge touching `user_id`, in either direction, oldest first.
    pub async fn find_for_user(&self, user_id: &str) -> AppResult<Vec<friendship::Model>> {
        Friendship::find()
            .filter(
                Condition::any()
                    .add(friendship::Column::RequesterId.eq(user_id))
                    .add(friendship::Column::AddresseeId.eq(user_id)),
            )
            .order_by_asc(friendship::Column::CreatedAt)
            .order_by_asc(friendship::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_error)
    }

    /// Insert a new edge. A live edge for the same pair surfaces as `Conflict`.
    pub async fn create(&self, model: friendship::ActiveModel) -> AppResult<friendship::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_error)
    }

    /// Answer a pending request addressed to `addressee_id`.
    ///
    /// Only the addressee may move an edge out of `pending`.
    pub async fn respond(
        &self,
        id: &str,
        addressee_id: &str,
        status: FriendshipStatus,
    ) -> AppResult<friendship::Model> {
        let result = Friendship::update_many()
            .col_expr(friendship::Column::Status, Expr::value(status))
            .filter(friendship::Column::Id.eq(id))
            .filter(friendship::Column::AddresseeId.eq(addressee_id))
            .filter(friendship::Column::Status.eq(FriendshipStatus::Pending))
            .exec(self.db.as_ref())
            .await
            .map_err(db_error)?;

        let edge = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Friendship {id}")))?;

        if result.rows_affected > 0 {
            return Ok(edge);
        }

        if edge.addressee_id != addressee_id {
            Err(AppError::Forbidden(
                "Only the addressee can answer a friend request".to_string(),
            ))
        } else {
            Err(AppError::Conflict(format!(
                "Friend request {id} is no longer pending"
            )))
        }
    }

    /// Delete an edge `user_id` is party to.
    pub async fn delete_as_party(&self, id: &str, user_id: &str) -> AppResult<()> {
        let result = Friendship::delete_many()
            .filter(friendship::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(friendship::Column::RequesterId.eq(user_id))
                    .add(friendship::Column::AddresseeId.eq(user_id)),
            )
            .exec(self.db.as_ref())
            .await
            .map_err(db_error)?;

        if result.rows_affected > 0 {
            return Ok(());
        }

        match self.find_by_id(id).await? {
            Some(_) => Err(AppError::Forbidden(
                "Only a party to the friendship can remove it".to_string(),
            )),
            None => Err(AppError::NotFound(format!("Friendship {id}"))),
        }
    }

    /// Delete declined edges between `user_id` and `other_id`.
    ///
    /// Returns the number of rows removed.
    pub async fn delete_declined_between(&self, user_id: &str, other_id: &str) -> AppResult<u64> {
        let pair = Condition::any()
            .add(
                Condition::all()
                    .add(friendship::Column::RequesterId.eq(user_id))
                    .add(friendship::Column::AddresseeId.eq(other_id)),
            )
            .add(
                Condition::all()
                    .add(friendship::Column::RequesterId.eq(other_id))
                    .add(friendship::Column::AddresseeId.eq(user_id)),
            );

        let result = Friendship::delete_many()
            .filter(pair)
            .filter(friendship::Column::Status.eq(FriendshipStatus::Declined))
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

    fn create_test_edge(
        id: &str,
        requester: &str,
        addressee: &str,
        status: FriendshipStatus,
    ) -> friendship::Model {
        friendship::Model {
            id: id.to_string(),
            requester_id: requester.to_string(),
            addressee_id: addressee.to_string(),
            status,
            created_at: Utc::now().into(),
        }
    }

    fn exec(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    #[tokio::test]
    async fn test_find_for_user() {
        let e1 = create_test_edge("f1", "alice", "bob", FriendshipStatus::Accepted);
        let e2 = create_test_edge("f2", "carol", "alice", FriendshipStatus::Pending);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[e1, e2]])
                .into_connection(),
        );

        let repo = FriendshipRepository::new(db);
        let edges = repo.find_for_user("alice").await.unwrap();

        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.touches("alice")));
    }

    #[tokio::test]
    async fn test_respond_accept() {
        let accepted = create_test_edge("f1", "alice", "bob", FriendshipStatus::Accepted);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec(1)])
                .append_query_results([[accepted]])
                .into_connection(),
        );

        let repo = FriendshipRepository::new(db);
        let edge = repo
            .respond("f1", "bob", FriendshipStatus::Accepted)
            .await
            .unwrap();

        assert_eq!(edge.status, FriendshipStatus::Accepted);
    }

    #[tokio::test]
    async fn test_respond_by_requester_is_forbidden() {
        let pending = create_test_edge("f1", "alice", "bob", FriendshipStatus::Pending);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec(0)])
                .append_query_results([[pending]])
                .into_connection(),
        );

        let repo = FriendshipRepository::new(db);
        let result = repo
            .respond("f1", "alice", FriendshipStatus::Accepted)
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_respond_missing_edge() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec(0)])
                .append_query_results([Vec::<friendship::Model>::new()])
                .into_connection(),
        );

        let repo = FriendshipRepository::new(db);
        let result = repo
            .respond("gone", "bob", FriendshipStatus::Declined)
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_as_party_by_stranger_is_forbidden() {
        let edge = create_test_edge("f1", "alice", "bob", FriendshipStatus::Accepted);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec(0)])
                .append_query_results([[edge]])
                .into_connection(),
        );

        let repo = FriendshipRepository::new(db);
        let result = repo.delete_as_party("f1", "mallory").await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_delete_declined_between() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([exec(2)])
                .into_connection(),
        );

        let repo = FriendshipRepository::new(db);
        let removed = repo.delete_declined_between("alice", "bob").await.unwrap();

        assert_eq!(removed, 2);
    }
}

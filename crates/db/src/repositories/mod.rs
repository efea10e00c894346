//! Database repositories.

pub mod comment;
pub mod friendship;
pub mod post;
pub mod reaction;
pub mod user;

pub use comment::CommentRepository;
pub use friendship::FriendshipRepository;
pub use post::PostRepository;
pub use reaction::ReactionRepository;
pub use user::UserRepository;

use geofeed_common::AppError;
use sea_orm::{DbErr, SqlErr};

/// Classify a store error into the application taxonomy.
///
/// Uniqueness violations become `Conflict`, dangling references become
/// `NotFound`, and failures to reach the store become `NetworkFailure`.
pub(crate) fn db_error(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => return AppError::Conflict(msg),
        Some(SqlErr::ForeignKeyConstraintViolation(msg)) => return AppError::NotFound(msg),
        _ => {}
    }

    match err {
        DbErr::Conn(e) => AppError::NetworkFailure(e.to_string()),
        DbErr::ConnectionAcquire(e) => AppError::NetworkFailure(e.to_string()),
        DbErr::RecordNotFound(msg) => AppError::NotFound(msg),
        other => AppError::Database(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::RuntimeErr;

    #[test]
    fn test_record_not_found_maps_to_not_found() {
        let err = db_error(DbErr::RecordNotFound("post p1".to_string()));
        assert_eq!(err, AppError::NotFound("post p1".to_string()));
    }

    #[test]
    fn test_connection_error_maps_to_network_failure() {
        let err = db_error(DbErr::Conn(RuntimeErr::Internal("refused".to_string())));
        assert!(matches!(err, AppError::NetworkFailure(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_errors_map_to_database() {
        let err = db_error(DbErr::Custom("boom".to_string()));
        assert!(matches!(err, AppError::Database(_)));
    }
}

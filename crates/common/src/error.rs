//! Error types for geofeed.

use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    // === Remote store outcomes ===
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Post not found: {0}")]
    PostNotFound(String),

    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    // === Caller errors ===
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // === Internal errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the error code shown alongside user-visible notifications.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NetworkFailure(_) => "NETWORK_FAILURE",
            Self::Conflict(_) => "CONFLICT",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::PostNotFound(_) => "POST_NOT_FOUND",
            Self::CommentNotFound(_) => "COMMENT_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether the error was caused by the caller rather than the store.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_)
                | Self::Forbidden(_)
                | Self::NotFound(_)
                | Self::UserNotFound(_)
                | Self::PostNotFound(_)
                | Self::CommentNotFound(_)
                | Self::Unauthorized
                | Self::BadRequest(_)
                | Self::Validation(_)
        )
    }

    /// Returns whether re-triggering the same action may succeed.
    ///
    /// Nothing retries automatically; this only decides the notification wording.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_))
    }

    /// Returns whether the error means the referenced row is gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::UserNotFound(_)
                | Self::PostNotFound(_)
                | Self::CommentNotFound(_)
        )
    }

    /// Log the error at a level matching its severity.
    pub fn log(&self, context: &str) {
        let code = self.error_code();
        if self.is_client_error() {
            tracing::debug!(error = %self, code = code, context = context, "Client error occurred");
        } else {
            tracing::error!(error = %self, code = code, context = context, "Store error occurred");
        }
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::NetworkFailure("timeout".to_string()).error_code(),
            "NETWORK_FAILURE"
        );
        assert_eq!(AppError::Conflict("x".to_string()).error_code(), "CONFLICT");
        assert_eq!(AppError::Unauthorized.error_code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_classification() {
        assert!(AppError::Forbidden("rls".to_string()).is_client_error());
        assert!(!AppError::Database("boom".to_string()).is_client_error());
        assert!(AppError::NetworkFailure("x".to_string()).is_retryable());
        assert!(!AppError::Conflict("x".to_string()).is_retryable());
        assert!(AppError::PostNotFound("p1".to_string()).is_not_found());
        assert!(!AppError::Forbidden("x".to_string()).is_not_found());
    }

    #[test]
    fn test_display() {
        let err = AppError::PostNotFound("p1".to_string());
        assert_eq!(err.to_string(), "Post not found: p1");
    }
}

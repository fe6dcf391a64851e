//! Authentication Error Types
//!
//! Centralized error handling for all authentication operations. Component
//! helpers (password hashing, token decoding) report expected failures as
//! `bool`/`Option`; only the service layer turns them into an `AuthError`.

use crate::token::TokenPurpose;

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("User not found or inactive")]
    AccountUnavailable,

    #[error("{0}")]
    Conflict(String),

    #[error("Too many attempts. Try again in {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Invalid {0} token")]
    InvalidToken(TokenPurpose),

    #[error("The {0} token has expired")]
    TokenExpired(TokenPurpose),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationFailed(String),

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status a transport layer should answer with.
    ///
    /// Token errors depend on the flow: session-bound tokens (access,
    /// refresh) are authentication failures, one-time tokens (email
    /// verification, password reset) are bad requests.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::InvalidCredentials | AuthError::AccountUnavailable => 401,
            AuthError::Conflict(_) => 409,
            AuthError::RateLimited { .. } => 429,
            AuthError::InvalidToken(purpose) | AuthError::TokenExpired(purpose) => {
                if purpose.is_session_bound() {
                    401
                } else {
                    400
                }
            }
            AuthError::NotFound(_) => 404,
            AuthError::ValidationFailed(_) => 422,
            AuthError::IncorrectPassword => 400,
            AuthError::Forbidden(_) => 403,
            AuthError::Database(_) | AuthError::Config(_) | AuthError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::AccountUnavailable => "account_unavailable",
            AuthError::Conflict(_) => "conflict",
            AuthError::RateLimited { .. } => "rate_limited",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::TokenExpired(_) => "token_expired",
            AuthError::NotFound(_) => "not_found",
            AuthError::ValidationFailed(_) => "validation_error",
            AuthError::IncorrectPassword => "incorrect_password",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::Config(_) => "configuration_error",
            AuthError::Database(_) | AuthError::Internal(_) => "internal_error",
        }
    }

    /// Seconds a client should wait before retrying, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AuthError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// JSON body for a transport response. Server-side failures are
    /// redacted so storage or configuration details never reach clients.
    pub fn to_body(&self) -> serde_json::Value {
        let message = match self {
            AuthError::Database(_) | AuthError::Config(_) | AuthError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let mut body = serde_json::json!({
            "error": self.error_code(),
            "message": message,
        });
        if let Some(retry_after) = self.retry_after() {
            body["retry_after"] = retry_after.into();
        }
        body
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AuthError::Database(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        AuthError::Internal("password hashing failed".to_string())
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(err: validator::ValidationErrors) -> Self {
        AuthError::ValidationFailed(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!("Blocking task failed: {:?}", err);
        AuthError::Internal("background task failed".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_follow_the_flow() {
        assert_eq!(AuthError::InvalidToken(TokenPurpose::Access).status_code(), 401);
        assert_eq!(AuthError::TokenExpired(TokenPurpose::Refresh).status_code(), 401);
        assert_eq!(
            AuthError::InvalidToken(TokenPurpose::EmailVerification).status_code(),
            400
        );
        assert_eq!(
            AuthError::TokenExpired(TokenPurpose::PasswordReset).status_code(),
            400
        );
    }

    #[test]
    fn rate_limited_body_carries_retry_after() {
        let body = AuthError::RateLimited { retry_after: 42 }.to_body();
        assert_eq!(body["error"], "rate_limited");
        assert_eq!(body["retry_after"], 42);
    }

    #[test]
    fn internal_details_are_redacted() {
        let body = AuthError::Database("connection refused at 10.0.0.3".into()).to_body();
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "An internal error occurred");
        assert!(body.get("retry_after").is_none());
    }

    #[test]
    fn credential_failures_are_generic() {
        let err = AuthError::InvalidCredentials;
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.to_string(), "Invalid email or password");
    }
}

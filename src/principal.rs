//! Request Principal
//!
//! The resolved caller of a protected request and the guards handlers
//! apply on top of plain authentication.

use crate::error::AuthError;
use crate::models::{SessionRecord, User};

use uuid::Uuid;

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Authenticated user together with the session the request came through
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: User,
    pub session: SessionRecord,
}

impl Principal {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    /// Require a verified email address
    pub fn require_verified_email(&self) -> Result<&User, AuthError> {
        if !self.user.email_verified() {
            return Err(AuthError::Forbidden(
                "Email verification required".to_string(),
            ));
        }
        Ok(&self.user)
    }

    /// Require superuser privileges
    pub fn require_superuser(&self) -> Result<&User, AuthError> {
        if !self.user.is_superuser() {
            return Err(AuthError::Forbidden("Insufficient privileges".to_string()));
        }
        Ok(&self.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::models::{DeviceInfo, NewSession};
    use chrono::Utc;

    fn principal() -> Principal {
        let now = Utc::now();
        let user = User::new("a@example.com", "A", "B", None, "hash", now);
        let session = SessionRecord::from_new(
            Uuid::new_v4(),
            NewSession::for_login(user.id, &DeviceInfo::default(), false, now, &AuthConfig::default()),
        );
        Principal { user, session }
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("Bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("abc.def.ghi"), None);
    }

    #[test]
    fn guards_return_forbidden() {
        let mut principal = principal();

        let err = principal.require_verified_email().unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert!(principal.require_superuser().is_err());

        principal.user.mark_email_verified(Utc::now());
        principal.user.set_superuser(true, Utc::now());
        assert!(principal.require_verified_email().is_ok());
        assert!(principal.require_superuser().is_ok());
    }
}

//! Authentication Models
//!
//! Data structures for authentication requests, responses, and stored entities.

use crate::config::AuthConfig;
use crate::error::AuthError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

// ============================================
// Stored Entities
// ============================================

/// User account
///
/// Lifecycle flags are private; they only change through the transition
/// methods, which keep a deleted account from ever being active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    #[serde(skip_serializing)]
    password_hash: String,
    email_verified: bool,
    is_active: bool,
    is_superuser: bool,
    deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// New active, unverified account
    pub fn new(
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        phone_number: Option<String>,
        password_hash: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(&email.into()),
            first_name: first_name.into(),
            last_name: last_name.into(),
            phone_number,
            password_hash: password_hash.into(),
            email_verified: false,
            is_active: true,
            is_superuser: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_superuser(&self) -> bool {
        self.is_superuser
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Active and not soft-deleted
    pub fn can_login(&self) -> bool {
        self.is_active && !self.is_deleted()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Reactivate a deactivated account. Deleted accounts must be restored
    /// instead.
    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<(), AuthError> {
        if self.is_deleted() {
            return Err(AuthError::Conflict(
                "A deleted account cannot be activated".to_string(),
            ));
        }
        self.is_active = true;
        self.updated_at = now;
        Ok(())
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.deleted_at = Some(now);
        self.updated_at = now;
    }

    pub fn restore(&mut self, now: DateTime<Utc>) {
        self.deleted_at = None;
        self.is_active = true;
        self.updated_at = now;
    }

    pub fn mark_email_verified(&mut self, now: DateTime<Utc>) {
        if !self.email_verified {
            self.email_verified = true;
            self.updated_at = now;
        }
    }

    pub fn set_password_hash(&mut self, hash: impl Into<String>, now: DateTime<Utc>) {
        self.password_hash = hash.into();
        self.updated_at = now;
    }

    pub fn set_superuser(&mut self, is_superuser: bool, now: DateTime<Utc>) {
        self.is_superuser = is_superuser;
        self.updated_at = now;
    }
}

/// Trim and lowercase an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Server-side record of a login
///
/// Only fingerprints of the issued tokens are kept. A revoked session stays
/// revoked: nothing outside this crate can flip `is_active` back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub access_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_name: Option<String>,
    pub device_fingerprint: Option<String>,
    is_active: bool,
}

impl SessionRecord {
    pub(crate) fn from_new(id: Uuid, new: NewSession) -> Self {
        Self {
            id,
            user_id: new.user_id,
            access_token_hash: None,
            refresh_token_hash: None,
            access_token_expires_at: new.access_token_expires_at,
            refresh_token_expires_at: new.refresh_token_expires_at,
            created_at: new.created_at,
            last_used_at: new.created_at,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            device_name: new.device_name,
            device_fingerprint: new.device_fingerprint,
            is_active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_access_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.access_token_expires_at
    }

    pub fn is_refresh_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh_token_expires_at
    }

    /// Active and still refreshable
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_refresh_expired(now)
    }

    pub(crate) fn revoke(&mut self) -> bool {
        std::mem::replace(&mut self.is_active, false)
    }

    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        self.last_used_at = at;
    }
}

/// Everything needed to open a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub user_id: Uuid,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_name: Option<String>,
    pub device_fingerprint: Option<String>,
}

impl NewSession {
    /// Session for a fresh login. "Remember me" stretches the session to the
    /// full refresh token lifetime.
    pub fn for_login(
        user_id: Uuid,
        device: &DeviceInfo,
        remember_me: bool,
        now: DateTime<Utc>,
        config: &AuthConfig,
    ) -> Self {
        let session_ttl = if remember_me {
            config.refresh_token_ttl()
        } else {
            config.session_ttl()
        };

        Self {
            user_id,
            access_token_expires_at: now + config.access_token_ttl(),
            refresh_token_expires_at: now + session_ttl,
            created_at: now,
            ip_address: device.ip_address.clone(),
            user_agent: device.user_agent.clone(),
            device_name: device.device_name.clone(),
            device_fingerprint: device.device_fingerprint.clone(),
        }
    }
}

/// Client metadata captured at login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_name: Option<String>,
    pub device_fingerprint: Option<String>,
}

impl DeviceInfo {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        let device_fingerprint = match (&ip_address, &user_agent) {
            (Some(ip), Some(ua)) => Some(device_fingerprint(ua, ip)),
            _ => None,
        };

        Self {
            ip_address,
            user_agent,
            device_name: None,
            device_fingerprint,
        }
    }

    pub fn with_device_name(mut self, device_name: Option<String>) -> Self {
        self.device_name = device_name;
        self
    }

    /// Key component for per-client rate limiting
    pub fn rate_limit_id(&self) -> &str {
        self.ip_address.as_deref().unwrap_or("unknown")
    }
}

/// Hex SHA-256 of `"{user_agent}:{ip_address}"`
pub fn device_fingerprint(user_agent: &str, ip_address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{user_agent}:{ip_address}").as_bytes());
    hex::encode(hasher.finalize())
}

// ============================================
// Request DTOs
// ============================================

fn validate_phone_number(phone: &str) -> Result<(), ValidationError> {
    let digits_only = phone
        .chars()
        .filter(|c| !matches!(c, '+' | '-' | ' ' | '(' | ')'))
        .collect::<String>();

    if digits_only.is_empty() || !digits_only.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("phone_number");
        err.message = Some("Invalid phone number format".into());
        return Err(err);
    }

    Ok(())
}

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "First name must be 1-100 characters"))]
    pub first_name: String,

    #[validate(length(min = 1, max = 100, message = "Last name must be 1-100 characters"))]
    pub last_name: String,

    #[validate(
        length(max = 20, message = "Phone number must be at most 20 characters"),
        custom(function = "validate_phone_number")
    )]
    pub phone_number: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    #[serde(default)]
    pub remember_me: bool,

    #[validate(length(max = 100, message = "Device name must be at most 100 characters"))]
    pub device_name: Option<String>,
}

// ============================================
// Response DTOs
// ============================================

/// Access/refresh token pair handed to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

impl TokenPair {
    pub fn bearer(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in,
        }
    }
}

/// Result of a successful registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    /// To be delivered to the user's inbox
    pub verification_token: String,
}

/// Result of a successful login
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub user: User,
    pub tokens: TokenPair,
    pub session: SessionRecord,
}

/// Active session as shown to its owner
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: SessionRecord,
    pub is_current: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        User::new("  Jane@Example.COM ", "Jane", "Doe", None, "$argon2id$stub", Utc::now())
    }

    #[test]
    fn new_user_is_active_and_unverified() {
        let user = user();
        assert_eq!(user.email, "jane@example.com");
        assert!(user.is_active());
        assert!(!user.email_verified());
        assert!(!user.is_superuser());
        assert!(user.can_login());
    }

    #[test]
    fn deleted_user_cannot_be_activated() {
        let mut user = user();
        user.soft_delete(Utc::now());
        assert!(!user.is_active());
        assert!(user.is_deleted());
        assert!(user.activate(Utc::now()).is_err());
        assert!(!user.can_login());

        user.restore(Utc::now());
        assert!(user.can_login());
    }

    #[test]
    fn deactivate_then_activate() {
        let mut user = user();
        user.deactivate(Utc::now());
        assert!(!user.can_login());
        user.activate(Utc::now()).unwrap();
        assert!(user.can_login());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_value(user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email_verified"], false);
    }

    #[test]
    fn session_token_hashes_are_never_serialized() {
        let now = Utc::now();
        let mut session = SessionRecord::from_new(
            Uuid::new_v4(),
            NewSession::for_login(
                Uuid::new_v4(),
                &DeviceInfo::default(),
                false,
                now,
                &AuthConfig::default(),
            ),
        );
        session.access_token_hash = Some("abc".into());
        session.refresh_token_hash = Some("def".into());

        let view = SessionView {
            session,
            is_current: true,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("access_token_hash").is_none());
        assert!(json.get("refresh_token_hash").is_none());
        assert_eq!(json["is_current"], true);
    }

    #[test]
    fn session_lifetime_depends_on_remember_me() {
        let config = AuthConfig::default();
        let now = Utc::now();
        let device = DeviceInfo::default();
        let user_id = Uuid::new_v4();

        let short = NewSession::for_login(user_id, &device, false, now, &config);
        let long = NewSession::for_login(user_id, &device, true, now, &config);

        assert_eq!(short.refresh_token_expires_at, now + Duration::days(7));
        assert_eq!(long.refresh_token_expires_at, now + Duration::days(30));
        assert_eq!(short.access_token_expires_at, now + Duration::minutes(30));
    }

    #[test]
    fn revoked_session_stays_revoked() {
        let now = Utc::now();
        let mut session = SessionRecord::from_new(
            Uuid::new_v4(),
            NewSession::for_login(
                Uuid::new_v4(),
                &DeviceInfo::default(),
                false,
                now,
                &AuthConfig::default(),
            ),
        );

        assert!(session.is_valid(now));
        assert!(session.revoke());
        assert!(!session.revoke());
        session.touch(now + Duration::minutes(1));
        assert!(!session.is_active());
        assert!(!session.is_valid(now));
    }

    #[test]
    fn device_fingerprint_needs_both_parts() {
        let both = DeviceInfo::new(Some("10.0.0.1".into()), Some("curl/8".into()));
        assert_eq!(
            both.device_fingerprint.as_deref(),
            Some(device_fingerprint("curl/8", "10.0.0.1").as_str())
        );

        let ip_only = DeviceInfo::new(Some("10.0.0.1".into()), None);
        assert!(ip_only.device_fingerprint.is_none());
        assert_eq!(ip_only.rate_limit_id(), "10.0.0.1");
        assert_eq!(DeviceInfo::default().rate_limit_id(), "unknown");
    }

    #[test]
    fn register_request_validation() {
        let valid = RegisterRequest {
            email: "jane@example.com".into(),
            password: "TestPassword123!".into(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            phone_number: Some("+1 (555) 010-0000".into()),
        };
        assert!(valid.validate().is_ok());

        let bad_email = RegisterRequest {
            email: "not-an-email".into(),
            ..valid.clone()
        };
        assert!(bad_email.validate().is_err());

        let bad_phone = RegisterRequest {
            phone_number: Some("call me".into()),
            ..valid.clone()
        };
        assert!(bad_phone.validate().is_err());

        let no_name = RegisterRequest {
            first_name: String::new(),
            ..valid
        };
        assert!(no_name.validate().is_err());
    }
}

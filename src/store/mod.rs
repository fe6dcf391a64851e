//! Persistence Interfaces
//!
//! The service talks to users and sessions only through these traits. Two
//! backends ship with the crate: in-memory maps for tests and single-node
//! setups, and PostgreSQL through sqlx against existing `users` and
//! `user_sessions` tables.

pub mod memory;
pub mod postgres;

pub use memory::{InMemorySessionStore, InMemoryUserRepository};
pub use postgres::{PgSessionStore, PgUserRepository};

use crate::error::AuthError;
use crate::models::{NewSession, SessionRecord, User};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// User lookup and persistence
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Look up by normalised email, including soft-deleted accounts
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError>;

    /// Insert or update. Fails with `Conflict` when another account already
    /// owns the email.
    async fn save(&self, user: &User) -> Result<(), AuthError>;
}

/// Session persistence
///
/// Revocation is terminal: no method may set an inactive session back to
/// active. `touch` writes only `last_used_at`, so a touch racing a revoke
/// never undoes it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: NewSession) -> Result<SessionRecord, AuthError>;

    /// Store the fingerprints of the tokens minted for a new session
    async fn record_tokens(
        &self,
        session_id: Uuid,
        access_token_hash: &str,
        refresh_token_hash: &str,
    ) -> Result<(), AuthError>;

    /// Replace the access token fingerprint and expiry, and the refresh
    /// fingerprint when one is given. Also bumps `last_used_at`.
    async fn rotate_access(
        &self,
        session_id: Uuid,
        access_token_hash: &str,
        access_token_expires_at: DateTime<Utc>,
        refresh_token_hash: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Session in any state
    async fn find(&self, session_id: Uuid) -> Result<Option<SessionRecord>, AuthError>;

    /// Session only if active and owned by `user_id`
    async fn find_active(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<SessionRecord>, AuthError>;

    async fn touch(&self, session_id: Uuid, at: DateTime<Utc>) -> Result<(), AuthError>;

    /// Returns false when the session does not exist, belongs to someone
    /// else, or is already revoked
    async fn revoke(&self, session_id: Uuid, user_id: Uuid) -> Result<bool, AuthError>;

    /// Revoke every active session of `user_id` and return how many
    async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError>;

    /// Active sessions, most recently used first
    async fn list_active(&self, user_id: Uuid) -> Result<Vec<SessionRecord>, AuthError>;
}

//! Commerce Authentication Core
//!
//! Authentication and session lifecycle for the commerce backend providing:
//! - User registration with email verification tokens
//! - Email/password login with server-side sessions
//! - JWT access and refresh tokens bound to a session
//! - Argon2id password hashing and strength policy
//! - Password reset and password change
//! - Session listing and revocation
//! - Sliding-window rate limiting for registration and login
//!
//! Storage is abstracted behind [`UserRepository`] and [`SessionStore`];
//! in-memory and PostgreSQL backends are included.
//!
//! # Configuration
//!
//! All configuration is loaded from environment variables:
//! - `JWT_SECRET` - Secret key for signing JWTs (required, min 32 chars)
//! - `JWT_ALGORITHM` - HS256, HS384 or HS512 (default: HS256)
//! - `JWT_ISSUER` - JWT issuer claim (default: "commerce-auth")
//! - `ACCESS_TOKEN_TTL` - Access token lifetime in seconds (default: 1800)
//! - `REFRESH_TOKEN_TTL` - Refresh token and "remember me" session lifetime (default: 2592000)
//! - `SESSION_TTL` - Regular session lifetime in seconds (default: 604800)
//! - `EMAIL_VERIFICATION_TTL` / `PASSWORD_RESET_TTL` - One-time token lifetimes
//! - `ARGON2_MEMORY_COST` / `ARGON2_TIME_COST` / `ARGON2_PARALLELISM` - Hashing cost
//! - `REGISTER_MAX_ATTEMPTS` / `REGISTER_WINDOW_MINUTES` - Registration rate limit (default: 3 per 60)
//! - `LOGIN_MAX_ATTEMPTS` / `LOGIN_WINDOW_MINUTES` - Login rate limit (default: 5 per 15)
//! - `ROTATE_REFRESH_TOKENS` - Issue a new refresh token on every refresh (default: false)
//!
//! # Usage
//!
//! ```rust,ignore
//! use commerce_auth::*;
//! use std::sync::Arc;
//!
//! let config = AuthConfig::from_env()?;
//! let clock = Arc::new(SystemClock);
//! let auth = AuthService::new(
//!     config,
//!     Arc::new(PgUserRepository::new(pool.clone())),
//!     Arc::new(PgSessionStore::new(pool)),
//!     Arc::new(RateLimiter::new(clock.clone())),
//!     clock,
//! )?;
//! let auth = Arc::new(auth);
//!
//! // Rate-limit counters only shrink when purged
//! let purger = auth.clone();
//! tokio::spawn(async move {
//!     let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
//!     loop {
//!         interval.tick().await;
//!         purger.purge_rate_limits();
//!     }
//! });
//!
//! let outcome = auth.authenticate(login_request, device).await?;
//! let principal = auth.authorize(authorization_header).await?;
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod password;
pub mod principal;
pub mod rate_limit;
pub mod service;
pub mod store;
pub mod token;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use error::AuthError;
pub use models::*;
pub use password::PasswordHasher;
pub use principal::{bearer_token, Principal};
pub use rate_limit::RateLimiter;
pub use service::AuthService;
pub use store::{
    InMemorySessionStore, InMemoryUserRepository, PgSessionStore, PgUserRepository, SessionStore,
    UserRepository,
};
pub use token::{TokenClaims, TokenCodec, TokenPurpose, TokenRejection, TokenScope};

//! Authentication Service
//!
//! Orchestrates registration, login, token refresh, email verification,
//! password reset/change and session management on top of the hasher,
//! token codec, rate limiter and the two stores.

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::*;
use crate::password::PasswordHasher;
use crate::principal::{bearer_token, Principal};
use crate::rate_limit::RateLimiter;
use crate::store::{SessionStore, UserRepository};
use crate::token::{
    fingerprint, fingerprint_matches, TokenCodec, TokenPurpose, TokenRejection, TokenScope,
};

use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Map a codec rejection to the error reported for `purpose`
fn token_error(purpose: TokenPurpose, rejection: TokenRejection) -> AuthError {
    match rejection {
        TokenRejection::Expired => AuthError::TokenExpired(purpose),
        TokenRejection::Invalid | TokenRejection::WrongPurpose => AuthError::InvalidToken(purpose),
    }
}

/// Authentication service
pub struct AuthService<U, S> {
    config: AuthConfig,
    users: Arc<U>,
    sessions: Arc<S>,
    hasher: PasswordHasher,
    tokens: TokenCodec,
    rate_limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl<U, S> AuthService<U, S>
where
    U: UserRepository,
    S: SessionStore,
{
    /// Create a new authentication service
    ///
    /// The configuration is validated first.
    pub fn new(
        config: AuthConfig,
        users: Arc<U>,
        sessions: Arc<S>,
        rate_limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        config.validate()?;

        let hasher = PasswordHasher::new(&config)?;
        let tokens = TokenCodec::new(&config, clock.clone());

        Ok(Self {
            config,
            users,
            sessions,
            hasher,
            tokens,
            rate_limiter,
            clock,
        })
    }

    /// Get reference to config
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Token primitives for the rest of the application
    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub fn password_hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Drop rate-limit entries idle for longer than the longest configured
    /// window. Hosts call this periodically; returns the number dropped.
    pub fn purge_rate_limits(&self) -> usize {
        let window = self
            .config
            .register_window_minutes
            .max(self.config.login_window_minutes);
        self.rate_limiter.purge_idle(window)
    }

    // ============================================
    // Helpers
    // ============================================

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        Ok(tokio::task::spawn_blocking(move || hasher.verify(&password, &hash)).await?)
    }

    async fn burn_dummy_verification(&self, password: &str) -> Result<(), AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.verify_dummy(&password)).await?;
        Ok(())
    }

    async fn load_active_user(&self, id: Uuid) -> Result<User, AuthError> {
        self.users
            .find_by_id(id)
            .await?
            .filter(User::can_login)
            .ok_or(AuthError::AccountUnavailable)
    }

    fn enforce_rate_limit(
        &self,
        key: &str,
        max_attempts: usize,
        window_minutes: i64,
    ) -> Result<(), AuthError> {
        if self.rate_limiter.is_allowed(key, max_attempts, window_minutes) {
            return Ok(());
        }

        let retry_after = self
            .rate_limiter
            .retry_after(key)
            .unwrap_or(window_minutes as u64 * 60);
        Err(AuthError::RateLimited { retry_after })
    }

    // ============================================
    // Registration
    // ============================================

    /// Register a new account and mint its email verification token.
    ///
    /// No session is created; the user still has to log in.
    pub async fn register(
        &self,
        mut req: RegisterRequest,
        client_ip: Option<&str>,
    ) -> Result<Registration, AuthError> {
        let rate_key = format!("register:{}", client_ip.unwrap_or("unknown"));
        self.enforce_rate_limit(
            &rate_key,
            self.config.register_max_attempts,
            self.config.register_window_minutes,
        )?;

        req.email = normalize_email(&req.email);
        req.validate()?;
        self.hasher.validate_strength(&req.password)?;

        if self.users.find_by_email(&req.email).await?.is_some() {
            return Err(AuthError::Conflict(
                "User with this email already exists".to_string(),
            ));
        }

        let password_hash = self.hash_password(&req.password).await?;
        let user = User::new(
            req.email,
            req.first_name.trim(),
            req.last_name.trim(),
            req.phone_number,
            password_hash,
            self.clock.now(),
        );
        self.users.save(&user).await?;

        let verification_token = self.tokens.encode(
            user.id,
            TokenScope::EmailVerification {
                email: user.email.clone(),
            },
            None,
        )?;

        self.rate_limiter.reset_attempts(&rate_key);
        tracing::info!(user_id = %user.id, "User registered");

        Ok(Registration {
            user,
            verification_token,
        })
    }

    // ============================================
    // Login
    // ============================================

    /// Authenticate with email and password and open a session
    pub async fn authenticate(
        &self,
        mut req: LoginRequest,
        device: DeviceInfo,
    ) -> Result<LoginOutcome, AuthError> {
        let rate_key = format!("login:{}", device.rate_limit_id());
        self.enforce_rate_limit(
            &rate_key,
            self.config.login_max_attempts,
            self.config.login_window_minutes,
        )?;

        req.email = normalize_email(&req.email);
        req.validate()?;

        let user = match self.users.find_by_email(&req.email).await? {
            Some(user) => user,
            None => {
                // Same cost as a real check so timing does not reveal accounts
                self.burn_dummy_verification(&req.password).await?;
                tracing::warn!("Login failed: unknown account");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.verify_password(&req.password, user.password_hash()).await? {
            tracing::warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.can_login() {
            tracing::warn!(user_id = %user.id, "Login failed: account inactive or deleted");
            return Err(AuthError::InvalidCredentials);
        }

        let now = self.clock.now();
        let device = match req.device_name {
            Some(name) => device.with_device_name(Some(name)),
            None => device,
        };
        let mut session = self
            .sessions
            .create(NewSession::for_login(
                user.id,
                &device,
                req.remember_me,
                now,
                &self.config,
            ))
            .await?;

        let access_token = self.tokens.encode(
            user.id,
            TokenScope::Access {
                session_id: session.id,
            },
            None,
        )?;
        let refresh_token = self.tokens.encode(
            user.id,
            TokenScope::Refresh {
                session_id: session.id,
            },
            Some(session.refresh_token_expires_at - now),
        )?;

        let access_hash = fingerprint(&access_token);
        let refresh_hash = fingerprint(&refresh_token);
        self.sessions
            .record_tokens(session.id, &access_hash, &refresh_hash)
            .await?;
        session.access_token_hash = Some(access_hash);
        session.refresh_token_hash = Some(refresh_hash);

        self.rate_limiter.reset_attempts(&rate_key);
        tracing::info!(user_id = %user.id, session_id = %session.id, "User logged in");

        Ok(LoginOutcome {
            user,
            tokens: TokenPair::bearer(
                access_token,
                refresh_token,
                self.config.access_token_ttl_secs,
            ),
            session,
        })
    }

    // ============================================
    // Token Refresh
    // ============================================

    /// Mint a new access token for the session behind `refresh_token`.
    ///
    /// The refresh token is handed back unchanged unless rotation is
    /// enabled, in which case a new one replaces it. Either way it never
    /// outlives the session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .tokens
            .check(refresh_token, TokenPurpose::Refresh)
            .map_err(|rejection| {
                tracing::warn!(?rejection, "Refresh token rejected");
                token_error(TokenPurpose::Refresh, rejection)
            })?;
        let session_id = claims
            .session_id()
            .ok_or(AuthError::InvalidToken(TokenPurpose::Refresh))?;

        let user = self
            .users
            .find_by_id(claims.subject())
            .await?
            .filter(User::can_login)
            .ok_or(AuthError::AccountUnavailable)?;

        let now = self.clock.now();
        let session = self
            .sessions
            .find_active(session_id, user.id)
            .await?
            .filter(|s| !s.is_refresh_expired(now))
            .ok_or_else(|| {
                tracing::warn!(session_id = %session_id, "Refresh for inactive or expired session");
                AuthError::InvalidToken(TokenPurpose::Refresh)
            })?;

        if !fingerprint_matches(refresh_token, session.refresh_token_hash.as_deref()) {
            tracing::warn!(session_id = %session_id, "Refresh token does not match session");
            return Err(AuthError::InvalidToken(TokenPurpose::Refresh));
        }

        let remaining = session.refresh_token_expires_at - now;
        let access_ttl = self.tokens.lifetimes().access.min(remaining);
        let access_token = self.tokens.encode(
            user.id,
            TokenScope::Access { session_id },
            Some(access_ttl),
        )?;

        let refresh_token = if self.config.rotate_refresh_tokens {
            self.tokens
                .encode(user.id, TokenScope::Refresh { session_id }, Some(remaining))?
        } else {
            refresh_token.to_string()
        };
        let rotated_refresh_hash = self
            .config
            .rotate_refresh_tokens
            .then(|| fingerprint(&refresh_token));

        self.sessions
            .rotate_access(
                session_id,
                &fingerprint(&access_token),
                now + access_ttl,
                rotated_refresh_hash.as_deref(),
                now,
            )
            .await?;

        Ok(TokenPair::bearer(
            access_token,
            refresh_token,
            access_ttl.num_seconds(),
        ))
    }

    // ============================================
    // Email Verification
    // ============================================

    /// Mark the email behind `token` as verified. Idempotent.
    pub async fn verify_email(&self, token: &str) -> Result<User, AuthError> {
        let invalid = AuthError::InvalidToken(TokenPurpose::EmailVerification);

        let claims = self
            .tokens
            .check(token, TokenPurpose::EmailVerification)
            .map_err(|_| invalid.clone())?;

        let mut user = self
            .users
            .find_by_id(claims.subject())
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

        // The address changed since the token was sent
        if claims.email() != Some(user.email.as_str()) {
            return Err(invalid);
        }

        if !user.email_verified() {
            user.mark_email_verified(self.clock.now());
            self.users.save(&user).await?;
            tracing::info!(user_id = %user.id, "Email verified");
        }

        Ok(user)
    }

    /// Mint a new verification token.
    ///
    /// Returns `None` when there is nothing to verify, so callers can answer
    /// the same way whether or not the account exists.
    pub async fn resend_verification(&self, email: &str) -> Result<Option<String>, AuthError> {
        let email = normalize_email(email);
        let user = match self.users.find_by_email(&email).await? {
            Some(user) if user.can_login() && !user.email_verified() => user,
            _ => return Ok(None),
        };

        let token = self.tokens.encode(
            user.id,
            TokenScope::EmailVerification {
                email: user.email.clone(),
            },
            None,
        )?;

        tracing::info!(user_id = %user.id, "Verification token reissued");
        Ok(Some(token))
    }

    // ============================================
    // Password Reset
    // ============================================

    /// Mint a password reset token.
    ///
    /// Unknown, inactive and deleted accounts yield `None` rather than an
    /// error to prevent email enumeration.
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>, AuthError> {
        let email = normalize_email(email);
        let user = match self.users.find_by_email(&email).await? {
            Some(user) if user.can_login() => user,
            _ => return Ok(None),
        };

        let token = self.tokens.encode(
            user.id,
            TokenScope::PasswordReset {
                email: user.email.clone(),
            },
            None,
        )?;

        tracing::info!(user_id = %user.id, "Password reset requested");
        Ok(Some(token))
    }

    /// Complete a password reset and revoke every active session
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<User, AuthError> {
        self.hasher.validate_strength(new_password)?;

        let claims = self
            .tokens
            .check(token, TokenPurpose::PasswordReset)
            .map_err(|rejection| token_error(TokenPurpose::PasswordReset, rejection))?;

        let mut user = self
            .users
            .find_by_id(claims.subject())
            .await?
            .filter(User::can_login)
            .ok_or_else(|| AuthError::NotFound("User".to_string()))?;

        let password_hash = self.hash_password(new_password).await?;
        user.set_password_hash(password_hash, self.clock.now());
        self.users.save(&user).await?;

        let revoked = self.sessions.revoke_all(user.id).await?;
        tracing::info!(user_id = %user.id, revoked, "Password reset, sessions revoked");

        Ok(user)
    }

    // ============================================
    // Password Change
    // ============================================

    /// Change the password of an authenticated user. Other sessions stay
    /// active.
    ///
    /// `user` only identifies the account. The stored record must still be
    /// able to log in, and its hash is the one checked and replaced.
    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> Result<User, AuthError> {
        let current = self.load_active_user(user.id).await?;

        if !self
            .verify_password(current_password, current.password_hash())
            .await?
        {
            return Err(AuthError::IncorrectPassword);
        }

        self.hasher.validate_strength(new_password)?;

        let password_hash = self.hash_password(new_password).await?;

        // Hashing suspends for a while; apply the change to the latest record
        let mut updated = self.load_active_user(user.id).await?;
        if updated.password_hash() != current.password_hash() {
            return Err(AuthError::IncorrectPassword);
        }
        updated.set_password_hash(password_hash, self.clock.now());
        self.users.save(&updated).await?;

        tracing::info!(user_id = %updated.id, "Password changed");
        Ok(updated)
    }

    // ============================================
    // Sessions
    // ============================================

    /// Revoke the given session, or every active session of its owner.
    ///
    /// Returns how many sessions were revoked.
    pub async fn logout(&self, session_id: Uuid, revoke_all: bool) -> Result<u64, AuthError> {
        let Some(session) = self.sessions.find(session_id).await? else {
            return Ok(0);
        };

        let revoked = if revoke_all {
            self.sessions.revoke_all(session.user_id).await?
        } else {
            u64::from(self.sessions.revoke(session_id, session.user_id).await?)
        };

        tracing::info!(
            user_id = %session.user_id,
            session_id = %session_id,
            revoked,
            "User logged out"
        );
        Ok(revoked)
    }

    /// Active sessions of `user_id`, most recently used first
    pub async fn list_sessions(
        &self,
        user_id: Uuid,
        current_session_id: Option<Uuid>,
    ) -> Result<Vec<SessionView>, AuthError> {
        let sessions = self.sessions.list_active(user_id).await?;

        Ok(sessions
            .into_iter()
            .map(|session| SessionView {
                is_current: Some(session.id) == current_session_id,
                session,
            })
            .collect())
    }

    /// Revoke one session, only if `user_id` owns it
    pub async fn revoke_session(&self, session_id: Uuid, user_id: Uuid) -> Result<bool, AuthError> {
        let revoked = self.sessions.revoke(session_id, user_id).await?;
        if revoked {
            tracing::info!(user_id = %user_id, session_id = %session_id, "Session revoked");
        }
        Ok(revoked)
    }

    // ============================================
    // Request Authorization
    // ============================================

    /// Resolve an `Authorization` header value to the current principal
    pub async fn authorize(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let token = authorization
            .and_then(bearer_token)
            .ok_or(AuthError::InvalidToken(TokenPurpose::Access))?;

        self.authorize_token(token).await
    }

    /// Resolve a raw access token to the current principal.
    ///
    /// The session must still be active, its access expiry not passed, and
    /// the token must be the one last issued for it.
    pub async fn authorize_token(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self
            .tokens
            .check(token, TokenPurpose::Access)
            .map_err(|rejection| token_error(TokenPurpose::Access, rejection))?;
        let session_id = claims
            .session_id()
            .ok_or(AuthError::InvalidToken(TokenPurpose::Access))?;

        let user = self
            .users
            .find_by_id(claims.subject())
            .await?
            .filter(User::can_login)
            .ok_or(AuthError::AccountUnavailable)?;

        let now = self.clock.now();
        let mut session = self
            .sessions
            .find_active(session_id, user.id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(session_id = %session_id, "Access token for inactive session");
                AuthError::InvalidToken(TokenPurpose::Access)
            })?;

        if session.is_access_expired(now) {
            return Err(AuthError::TokenExpired(TokenPurpose::Access));
        }

        if !fingerprint_matches(token, session.access_token_hash.as_deref()) {
            tracing::warn!(session_id = %session_id, "Access token superseded");
            return Err(AuthError::InvalidToken(TokenPurpose::Access));
        }

        self.sessions.touch(session_id, now).await?;
        session.touch(now);

        Ok(Principal { user, session })
    }
}

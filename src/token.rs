//! Token Codec
//!
//! Signs and verifies compact, expiring, purpose-tagged JWTs. Claims are a
//! tagged union keyed by `token_type`, so a decoded token is always one of
//! the four known purposes with exactly the fields that purpose requires.
//!
//! Decoding does not check expiry. Callers run
//! [`TokenCodec::decode`], [`TokenCodec::is_expired`] and
//! [`TokenCodec::has_purpose`] separately (or [`TokenCodec::check`]) so they
//! can tell an invalid token from an expired or misused one.

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::AuthError;

use chrono::Duration;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Access,
    Refresh,
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Access => "access",
            TokenPurpose::Refresh => "refresh",
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }

    /// Access and refresh tokens are tied to a session record
    pub fn is_session_bound(&self) -> bool {
        matches!(self, TokenPurpose::Access | TokenPurpose::Refresh)
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TokenPurpose::Access => "access",
            TokenPurpose::Refresh => "refresh",
            TokenPurpose::EmailVerification => "email verification",
            TokenPurpose::PasswordReset => "password reset",
        };
        f.write_str(label)
    }
}

/// Claims carried by access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Session the token belongs to
    pub session_id: Uuid,
    /// Issuer
    pub iss: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    /// JWT ID (unique identifier)
    pub jti: Uuid,
}

/// Claims carried by email verification and password reset tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Address the token was issued for
    pub email: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// Decoded token claims, one variant per purpose
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "token_type", rename_all = "snake_case")]
pub enum TokenClaims {
    Access(SessionClaims),
    Refresh(SessionClaims),
    EmailVerification(EmailClaims),
    PasswordReset(EmailClaims),
}

impl TokenClaims {
    pub fn purpose(&self) -> TokenPurpose {
        match self {
            TokenClaims::Access(_) => TokenPurpose::Access,
            TokenClaims::Refresh(_) => TokenPurpose::Refresh,
            TokenClaims::EmailVerification(_) => TokenPurpose::EmailVerification,
            TokenClaims::PasswordReset(_) => TokenPurpose::PasswordReset,
        }
    }

    pub fn subject(&self) -> Uuid {
        match self {
            TokenClaims::Access(c) | TokenClaims::Refresh(c) => c.sub,
            TokenClaims::EmailVerification(c) | TokenClaims::PasswordReset(c) => c.sub,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            TokenClaims::Access(c) | TokenClaims::Refresh(c) => Some(c.session_id),
            _ => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            TokenClaims::EmailVerification(c) | TokenClaims::PasswordReset(c) => Some(&c.email),
            _ => None,
        }
    }

    pub fn issued_at(&self) -> i64 {
        match self {
            TokenClaims::Access(c) | TokenClaims::Refresh(c) => c.iat,
            TokenClaims::EmailVerification(c) | TokenClaims::PasswordReset(c) => c.iat,
        }
    }

    /// Expiry as a Unix timestamp
    pub fn expires_at(&self) -> i64 {
        match self {
            TokenClaims::Access(c) | TokenClaims::Refresh(c) => c.exp,
            TokenClaims::EmailVerification(c) | TokenClaims::PasswordReset(c) => c.exp,
        }
    }

    pub fn token_id(&self) -> Uuid {
        match self {
            TokenClaims::Access(c) | TokenClaims::Refresh(c) => c.jti,
            TokenClaims::EmailVerification(c) | TokenClaims::PasswordReset(c) => c.jti,
        }
    }
}

/// Purpose-specific data for a token being issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenScope {
    Access { session_id: Uuid },
    Refresh { session_id: Uuid },
    EmailVerification { email: String },
    PasswordReset { email: String },
}

impl TokenScope {
    pub fn purpose(&self) -> TokenPurpose {
        match self {
            TokenScope::Access { .. } => TokenPurpose::Access,
            TokenScope::Refresh { .. } => TokenPurpose::Refresh,
            TokenScope::EmailVerification { .. } => TokenPurpose::EmailVerification,
            TokenScope::PasswordReset { .. } => TokenPurpose::PasswordReset,
        }
    }
}

/// Why a presented token was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// Bad signature, malformed payload or unsupported algorithm
    Invalid,
    /// Structurally valid but issued for another purpose
    WrongPurpose,
    /// Valid and correctly scoped, but past its expiry
    Expired,
}

/// Default lifetime per purpose
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
    pub email_verification: Duration,
    pub password_reset: Duration,
}

impl TokenLifetimes {
    pub fn for_purpose(&self, purpose: TokenPurpose) -> Duration {
        match purpose {
            TokenPurpose::Access => self.access,
            TokenPurpose::Refresh => self.refresh,
            TokenPurpose::EmailVerification => self.email_verification,
            TokenPurpose::PasswordReset => self.password_reset,
        }
    }
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::minutes(30),
            refresh: Duration::days(30),
            email_verification: Duration::hours(24),
            password_reset: Duration::hours(1),
        }
    }
}

impl From<&AuthConfig> for TokenLifetimes {
    fn from(config: &AuthConfig) -> Self {
        Self {
            access: config.access_token_ttl(),
            refresh: config.refresh_token_ttl(),
            email_verification: config.email_verification_ttl(),
            password_reset: config.password_reset_ttl(),
        }
    }
}

/// Signs and verifies purpose-tagged tokens with a shared secret
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    header: Header,
    validation: Validation,
    issuer: String,
    lifetimes: TokenLifetimes,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Create a codec from the secret, algorithm, issuer and lifetimes in
    /// `config`
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

        let mut validation = Validation::new(config.jwt_algorithm);
        validation.validate_exp = false;
        validation.set_issuer(&[&config.jwt_issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        Self {
            encoding_key,
            decoding_key,
            header: Header::new(config.jwt_algorithm),
            validation,
            issuer: config.jwt_issuer.clone(),
            lifetimes: TokenLifetimes::from(config),
            clock,
        }
    }

    pub fn lifetimes(&self) -> &TokenLifetimes {
        &self.lifetimes
    }

    /// Issue a signed token for `subject`
    ///
    /// `ttl` overrides the default lifetime for the scope's purpose.
    pub fn encode(
        &self,
        subject: Uuid,
        scope: TokenScope,
        ttl: Option<Duration>,
    ) -> Result<String, AuthError> {
        let now = self.clock.now();
        let ttl = ttl.unwrap_or_else(|| self.lifetimes.for_purpose(scope.purpose()));
        let iat = now.timestamp();
        let exp = (now + ttl).timestamp();
        let iss = self.issuer.clone();
        let jti = Uuid::new_v4();

        let claims = match scope {
            TokenScope::Access { session_id } => TokenClaims::Access(SessionClaims {
                sub: subject,
                session_id,
                iss,
                iat,
                exp,
                jti,
            }),
            TokenScope::Refresh { session_id } => TokenClaims::Refresh(SessionClaims {
                sub: subject,
                session_id,
                iss,
                iat,
                exp,
                jti,
            }),
            TokenScope::EmailVerification { email } => {
                TokenClaims::EmailVerification(EmailClaims {
                    sub: subject,
                    email,
                    iss,
                    iat,
                    exp,
                    jti,
                })
            }
            TokenScope::PasswordReset { email } => TokenClaims::PasswordReset(EmailClaims {
                sub: subject,
                email,
                iss,
                iat,
                exp,
                jti,
            }),
        };

        encode(&self.header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("JWT encode: {e}")))
    }

    /// Verify signature and structure and return the claims
    ///
    /// Expiry is not checked.
    pub fn decode(&self, token: &str) -> Option<TokenClaims> {
        match decode::<TokenClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!("JWT validation failed: {:?}", e.kind());
                None
            }
        }
    }

    pub fn is_expired(&self, claims: &TokenClaims) -> bool {
        self.clock.now().timestamp() >= claims.expires_at()
    }

    pub fn has_purpose(&self, claims: &TokenClaims, expected: TokenPurpose) -> bool {
        claims.purpose() == expected
    }

    /// Decode, then check purpose and expiry, in that order
    pub fn check(&self, token: &str, expected: TokenPurpose) -> Result<TokenClaims, TokenRejection> {
        let claims = self.decode(token).ok_or(TokenRejection::Invalid)?;

        if !self.has_purpose(&claims, expected) {
            return Err(TokenRejection::WrongPurpose);
        }

        if self.is_expired(&claims) {
            return Err(TokenRejection::Expired);
        }

        Ok(claims)
    }
}

/// SHA-256 fingerprint of a raw token, hex-encoded.
///
/// This is the value stored on session records; raw tokens are never kept.
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare `token` against a stored fingerprint in constant time.
///
/// A missing fingerprint never matches.
pub fn fingerprint_matches(token: &str, stored: Option<&str>) -> bool {
    match stored {
        Some(stored) => fingerprint(token)
            .as_bytes()
            .ct_eq(stored.as_bytes())
            .into(),
        None => false,
    }
}

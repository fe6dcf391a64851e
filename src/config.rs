//! Authentication Configuration
//!
//! All configuration values are loaded from environment variables.
//! No hardcoded secrets or sensitive data.

use crate::error::AuthError;
use chrono::Duration;
use jsonwebtoken::Algorithm;
use std::env;
use std::str::FromStr;

/// Authentication configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for signing tokens (from JWT_SECRET env var)
    pub jwt_secret: String,

    /// HMAC signing algorithm (from JWT_ALGORITHM env var)
    pub jwt_algorithm: Algorithm,

    /// JWT issuer (from JWT_ISSUER env var)
    pub jwt_issuer: String,

    /// Access token lifetime in seconds (from ACCESS_TOKEN_TTL env var)
    pub access_token_ttl_secs: i64,

    /// Refresh token lifetime in seconds; also the lifetime of a
    /// "remember me" session (from REFRESH_TOKEN_TTL env var)
    pub refresh_token_ttl_secs: i64,

    /// Lifetime of a regular session in seconds (from SESSION_TTL env var)
    pub session_ttl_secs: i64,

    /// Email verification token lifetime in seconds (from EMAIL_VERIFICATION_TTL env var)
    pub email_verification_ttl_secs: i64,

    /// Password reset token lifetime in seconds (from PASSWORD_RESET_TTL env var)
    pub password_reset_ttl_secs: i64,

    /// Argon2 memory cost in KiB (from ARGON2_MEMORY_COST env var)
    pub argon2_memory_cost: u32,

    /// Argon2 time cost (iterations) (from ARGON2_TIME_COST env var)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (from ARGON2_PARALLELISM env var)
    pub argon2_parallelism: u32,

    /// Minimum password length (from MIN_PASSWORD_LENGTH env var)
    pub min_password_length: usize,

    /// Registration attempts allowed per window and IP (from REGISTER_MAX_ATTEMPTS env var)
    pub register_max_attempts: usize,

    /// Registration window in minutes (from REGISTER_WINDOW_MINUTES env var)
    pub register_window_minutes: i64,

    /// Login attempts allowed per window and IP (from LOGIN_MAX_ATTEMPTS env var)
    pub login_max_attempts: usize,

    /// Login window in minutes (from LOGIN_WINDOW_MINUTES env var)
    pub login_window_minutes: i64,

    /// Issue a new refresh token on every refresh (from ROTATE_REFRESH_TOKENS env var)
    pub rotate_refresh_tokens: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_algorithm: Algorithm::HS256,
            jwt_issuer: "commerce-auth".to_string(),
            access_token_ttl_secs: 1800,       // 30 minutes
            refresh_token_ttl_secs: 2_592_000, // 30 days
            session_ttl_secs: 604_800,         // 7 days
            email_verification_ttl_secs: 86400,
            password_reset_ttl_secs: 3600,
            argon2_memory_cost: 65536, // 64 MiB
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            min_password_length: 8,
            register_max_attempts: 3,
            register_window_minutes: 60,
            login_max_attempts: 5,
            login_window_minutes: 15,
            rotate_refresh_tokens: false,
        }
    }
}

fn parsed<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AuthConfig {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable optional values fall back to their defaults.
    /// `JWT_SECRET` is required.
    pub fn from_env() -> Result<Self, AuthError> {
        let defaults = Self::default();

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| {
            AuthError::Config("JWT_SECRET environment variable must be set".to_string())
        })?;

        let jwt_algorithm = match env::var("JWT_ALGORITHM") {
            Ok(name) => Algorithm::from_str(name.trim()).map_err(|_| {
                AuthError::Config(format!("JWT_ALGORITHM '{name}' is not a known algorithm"))
            })?,
            Err(_) => defaults.jwt_algorithm,
        };

        Ok(Self {
            jwt_secret,
            jwt_algorithm,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            access_token_ttl_secs: parsed("ACCESS_TOKEN_TTL", defaults.access_token_ttl_secs),
            refresh_token_ttl_secs: parsed("REFRESH_TOKEN_TTL", defaults.refresh_token_ttl_secs),
            session_ttl_secs: parsed("SESSION_TTL", defaults.session_ttl_secs),
            email_verification_ttl_secs: parsed(
                "EMAIL_VERIFICATION_TTL",
                defaults.email_verification_ttl_secs,
            ),
            password_reset_ttl_secs: parsed("PASSWORD_RESET_TTL", defaults.password_reset_ttl_secs),
            argon2_memory_cost: parsed("ARGON2_MEMORY_COST", defaults.argon2_memory_cost),
            argon2_time_cost: parsed("ARGON2_TIME_COST", defaults.argon2_time_cost),
            argon2_parallelism: parsed("ARGON2_PARALLELISM", defaults.argon2_parallelism),
            min_password_length: parsed("MIN_PASSWORD_LENGTH", defaults.min_password_length),
            register_max_attempts: parsed("REGISTER_MAX_ATTEMPTS", defaults.register_max_attempts),
            register_window_minutes: parsed(
                "REGISTER_WINDOW_MINUTES",
                defaults.register_window_minutes,
            ),
            login_max_attempts: parsed("LOGIN_MAX_ATTEMPTS", defaults.login_max_attempts),
            login_window_minutes: parsed("LOGIN_WINDOW_MINUTES", defaults.login_window_minutes),
            rotate_refresh_tokens: env::var("ROTATE_REFRESH_TOKENS")
                .ok()
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.rotate_refresh_tokens),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.jwt_secret.len() < 32 {
            return Err(AuthError::Config(
                "JWT_SECRET must be at least 32 characters".to_string(),
            ));
        }

        if !matches!(
            self.jwt_algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::Config(
                "JWT_ALGORITHM must be one of HS256, HS384, HS512".to_string(),
            ));
        }

        if self.access_token_ttl_secs <= 0
            || self.email_verification_ttl_secs <= 0
            || self.password_reset_ttl_secs <= 0
            || self.session_ttl_secs <= 0
        {
            return Err(AuthError::Config("token lifetimes must be positive".to_string()));
        }

        if self.refresh_token_ttl_secs <= self.access_token_ttl_secs {
            return Err(AuthError::Config(
                "REFRESH_TOKEN_TTL must be greater than ACCESS_TOKEN_TTL".to_string(),
            ));
        }

        if self.session_ttl_secs > self.refresh_token_ttl_secs {
            return Err(AuthError::Config(
                "SESSION_TTL must not exceed REFRESH_TOKEN_TTL".to_string(),
            ));
        }

        if self.min_password_length < 8 {
            return Err(AuthError::Config(
                "MIN_PASSWORD_LENGTH must be at least 8".to_string(),
            ));
        }

        if self.argon2_parallelism == 0
            || self.argon2_time_cost == 0
            || self.argon2_memory_cost < 8 * self.argon2_parallelism
        {
            return Err(AuthError::Config(
                "ARGON2_MEMORY_COST must be at least 8 KiB per lane".to_string(),
            ));
        }

        if self.register_max_attempts == 0
            || self.login_max_attempts == 0
            || self.register_window_minutes <= 0
            || self.login_window_minutes <= 0
        {
            return Err(AuthError::Config(
                "rate limit attempts and windows must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::seconds(self.access_token_ttl_secs)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_token_ttl_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl_secs)
    }

    pub fn email_verification_ttl(&self) -> Duration {
        Duration::seconds(self.email_verification_ttl_secs)
    }

    pub fn password_reset_ttl(&self) -> Duration {
        Duration::seconds(self.password_reset_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "a".repeat(32),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_short_secret() {
        let config = AuthConfig {
            jwt_secret: "short".to_string(),
            ..valid_config()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_asymmetric_algorithm() {
        let config = AuthConfig {
            jwt_algorithm: Algorithm::RS256,
            ..valid_config()
        };

        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }

    #[test]
    fn test_config_refresh_must_outlive_access() {
        let config = AuthConfig {
            refresh_token_ttl_secs: 60,
            session_ttl_secs: 60,
            ..valid_config()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_weak_password_policy() {
        let config = AuthConfig {
            min_password_length: 6,
            ..valid_config()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_lifetimes() {
        let config = valid_config();
        assert_eq!(config.access_token_ttl(), Duration::minutes(30));
        assert_eq!(config.refresh_token_ttl(), Duration::days(30));
        assert_eq!(config.session_ttl(), Duration::days(7));
        assert_eq!(config.email_verification_ttl(), Duration::hours(24));
        assert_eq!(config.password_reset_ttl(), Duration::hours(1));
    }
}

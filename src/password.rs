//! Password Hashing
//!
//! Argon2id hashing, verification and the password strength policy.

use crate::config::AuthConfig;
use crate::error::AuthError;

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use std::sync::{Arc, OnceLock};

/// Characters that satisfy the "special character" rule
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Argon2id password hasher
///
/// Cheap to clone; clones share the lazily computed dummy hash used to
/// equalise login timing for unknown accounts.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
    min_length: usize,
    dummy_hash: Arc<OnceLock<String>>,
}

impl PasswordHasher {
    /// Create a hasher from the Argon2 cost settings in `config`
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let params = Params::new(
            config.argon2_memory_cost,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| AuthError::Config(format!("invalid argon2 parameters: {e}")))?;

        Ok(Self {
            params,
            min_length: config.min_password_length,
            dummy_hash: Arc::new(OnceLock::new()),
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password using Argon2id with a fresh random salt
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        if password.is_empty() {
            return Err(AuthError::ValidationFailed(
                "Password must not be empty".to_string(),
            ));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)?
            .to_string();

        Ok(hash)
    }

    /// Verify a password against a stored PHC hash
    ///
    /// A malformed hash never matches. The digest comparison inside argon2
    /// is constant-time.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("Stored password hash is malformed: {}", e);
                return false;
            }
        };

        self.argon2()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Run one verification against a throwaway hash.
    ///
    /// Used when no account matches so the caller spends the same time as
    /// a real password check.
    pub fn verify_dummy(&self, password: &str) {
        let dummy = self.dummy_hash.get_or_init(|| {
            self.hash("placeholder-Password-1!")
                .unwrap_or_default()
        });
        let _ = self.verify(password, dummy);
    }

    /// Check the password strength policy
    pub fn is_strong(&self, password: &str) -> bool {
        is_strong_password(password, self.min_length)
    }

    /// Strength check that reports which rule failed
    pub fn validate_strength(&self, password: &str) -> Result<(), AuthError> {
        if self.is_strong(password) {
            return Ok(());
        }

        Err(AuthError::ValidationFailed(format!(
            "Password must be at least {} characters and contain an uppercase letter, \
             a lowercase letter, a digit and one of {}",
            self.min_length, SPECIAL_CHARACTERS
        )))
    }
}

/// Length of at least `min_length` characters plus at least one uppercase
/// letter, one lowercase letter, one digit and one special character.
pub fn is_strong_password(password: &str, min_length: usize) -> bool {
    if password.chars().count() < min_length.max(8) {
        return false;
    }

    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIAL_CHARACTERS.contains(c));

    has_upper && has_lower && has_digit && has_special
}

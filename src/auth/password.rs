use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::PasswordConfig;
use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

/// Salted Argon2id hashing with tunable cost.
#[derive(Clone)]
pub struct Passwords {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl Passwords {
    pub fn new(cfg: &PasswordConfig) -> Result<Self, PasswordError> {
        let defaults = Params::default();
        let params = Params::new(
            cfg.memory_kib.unwrap_or(defaults.m_cost()),
            cfg.iterations.unwrap_or(defaults.t_cost()),
            cfg.parallelism.unwrap_or(defaults.p_cost()),
            None,
        )
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut passwords = Self {
            argon2,
            dummy_hash: String::new(),
        };
        // Verified against when the account does not exist, so that a miss
        // costs as much as a wrong password.
        passwords.dummy_hash = passwords.hash("recipehub-dummy-password")?;
        Ok(passwords)
    }

    pub fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                PasswordError::Hashing(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Returns `Ok(false)` on mismatch; errors only when `hash` is not a PHC string.
    pub fn verify(&self, plain: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            PasswordError::Hashing(e.to_string())
        })?;
        Ok(self
            .argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    /// Burns one verification so unknown accounts are not faster to reject.
    pub fn verify_dummy(&self, plain: &str) {
        let _ = self.verify(plain, &self.dummy_hash);
    }
}

#[cfg(test)]
pub(crate) fn fast_passwords() -> Passwords {
    Passwords::new(&PasswordConfig {
        memory_kib: Some(1024),
        iterations: Some(1),
        parallelism: Some(1),
    })
    .expect("valid argon2 params")
}

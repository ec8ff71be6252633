//! Password hashing (Argon2id with a server-side pepper).

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("invalid argon2 parameters: {0}")]
    Params(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// Hashes and verifies passwords.
///
/// The pepper is mixed in as the Argon2 secret, so a leaked hash table alone
/// is not enough to mount an offline attack.
#[derive(Clone)]
pub struct PasswordHasher {
    pepper: Vec<u8>,
    params: Params,
}

impl PasswordHasher {
    pub fn new(pepper: impl Into<Vec<u8>>) -> Self {
        Self {
            pepper: pepper.into(),
            params: Params::default(),
        }
    }

    /// Custom cost parameters (memory in KiB, iteration count).
    pub fn with_cost(
        pepper: impl Into<Vec<u8>>,
        memory_kib: u32,
        iterations: u32,
    ) -> Result<Self, PasswordError> {
        let params = Params::new(memory_kib, iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| PasswordError::Params(e.to_string()))?;
        Ok(Self {
            pepper: pepper.into(),
            params,
        })
    }

    fn argon2(&self) -> Result<Argon2<'_>, PasswordError> {
        if self.pepper.is_empty() {
            return Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone()));
        }
        Argon2::new_with_secret(&self.pepper, Algorithm::Argon2id, Version::V0x13, self.params.clone())
            .map_err(|e| PasswordError::Params(e.to_string()))
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?
            .to_string())
    }

    /// `Ok(false)` on mismatch; `Err` only if the stored hash is unusable.
    pub fn verify(&self, password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(stored_hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
        Ok(self.argon2()?.verify_password(password.as_bytes(), &parsed).is_ok())
    }
}

impl core::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

//! Argon2id credential hashing
//!
//! Hashes are PHC strings, so verification always uses the parameters the hash
//! was created with. Unknown identifiers are checked against a dummy hash to
//! keep both login failure paths equally expensive.

use crate::crypto::SecureMemory;
use crate::{Result, crypto_error};
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

/// Argon2id cost parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl PasswordConfig {
    /// Cheap parameters for tests
    pub fn for_testing() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }
}

pub struct PasswordHasher {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(config: &PasswordConfig) -> Result<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| crypto_error!("Argon2 params error: {}", e))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&argon2, &hex::encode(SecureMemory::secure_random_bytes::<16>()))?;

        Ok(Self { argon2, dummy_hash })
    }

    /// Produce a PHC string for `password`
    pub fn hash(&self, password: &str) -> Result<String> {
        hash_with(&self.argon2, password)
    }

    /// Check `password` against a stored PHC string
    ///
    /// A malformed stored hash is a crypto error, not a mismatch.
    pub fn verify(&self, password: &str, phc: &str) -> Result<bool> {
        let parsed =
            PasswordHash::new(phc).map_err(|e| crypto_error!("Stored credential hash invalid: {}", e))?;

        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Burn the cost of one verification; always `false`
    pub fn verify_dummy(&self, password: &str) -> bool {
        let _ = self.verify(password, &self.dummy_hash);
        false
    }
}

fn hash_with(argon2: &Argon2<'_>, password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(&SecureMemory::secure_random_bytes::<16>())
        .map_err(|e| crypto_error!("Salt encoding failed: {}", e))?;

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| crypto_error!("Argon2 hashing failed: {}", e))
}

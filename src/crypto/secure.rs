//! Key material and constant-time helpers
//!
//! 1. Keyed digests for one-time codes (the code itself is never stored)
//! 2. Ed25519 signing keys for escalation tokens
//! 3. Constant-time comparison and secure randomness

use crate::config::SecurityConfig;
use crate::types::PrincipalId;
use crate::{Result, crypto_error};
use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

/// Keyed digest of login codes
#[derive(Clone)]
pub struct SecureSaltManager {
    otp_salt: Zeroizing<[u8; 32]>,
}

impl SecureSaltManager {
    /// Create salt manager from validated configuration
    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        Ok(Self {
            otp_salt: Zeroizing::new(config.otp_salt_bytes()?),
        })
    }

    /// Create for testing with a secure random salt
    pub fn for_testing() -> Self {
        Self {
            otp_salt: Zeroizing::new(SecureMemory::secure_random_bytes::<32>()),
        }
    }

    /// Digest a one-time code bound to its principal
    pub fn digest_one_time_code(&self, principal_id: &PrincipalId, code: &str) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_keyed(&self.otp_salt);
        hasher.update(principal_id.as_str().as_bytes());
        hasher.update(&[0u8]);
        hasher.update(code.as_bytes());
        hasher.finalize().into()
    }
}

/// Ed25519 key pair used to sign escalation tokens
///
/// The signing key zeroizes itself on drop.
pub struct SecureKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    created_at: u64,
}

impl SecureKeyPair {
    /// Deterministic key pair from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self::from_signing_key(signing_key)
    }

    /// Fresh random key pair
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self::from_signing_key(SigningKey::generate(&mut rng))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            signing_key,
            verifying_key,
            created_at,
        }
    }

    /// Get public key
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Short stable identifier derived from the public key
    pub fn key_id(&self) -> String {
        let digest = blake3::hash(&self.public_key());
        hex::encode(&digest.as_bytes()[..8])
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let signature = Ed25519Signature::from_slice(signature)
            .map_err(|_| crypto_error!("Invalid signature format"))?;

        self.verifying_key
            .verify(message, &signature)
            .map_err(|_| crypto_error!("Signature verification failed"))
    }
}

/// Secure memory utilities
pub struct SecureMemory;

impl SecureMemory {
    /// Securely compare two byte arrays in constant time
    pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
        use subtle::ConstantTimeEq;
        if a.len() != b.len() {
            return false;
        }
        a.ct_eq(b).into()
    }

    /// Generate cryptographically secure random bytes
    pub fn secure_random_bytes<const N: usize>() -> [u8; N] {
        let mut bytes = [0u8; N];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }
}

//! Cryptographic primitives for the election core

pub mod audit;
pub mod ballot_cipher;
pub mod escalation_token;
pub mod key_ring;
pub mod password;
pub mod secure;

pub use crate::types::Hash;

pub use secure::{SecureKeyPair, SecureMemory, SecureSaltManager};

pub use key_ring::{KeyRing, KeyRingStats, KeyRotationEvent, RotationEventType};

pub use escalation_token::{
    BallotCast, Claims, FullSession, IssuedToken, PendingCredential, Purpose, ScopedClaims,
    SelectionTarget, SelectionVerified, TokenLifetimes, TokenSigner, VerifiedToken, VoterPreAuth,
};

pub use ballot_cipher::BallotCipher;

pub use password::{PasswordConfig, PasswordHasher};

pub use audit::{AuditIntegrityReport, AuditRecord, VerificationAuditor, verify_chain};

/// Cryptographic utilities
pub struct CryptoUtils;

impl CryptoUtils {
    /// Hash arbitrary data with Blake3
    pub fn hash(data: &[u8]) -> Hash {
        blake3::hash(data).into()
    }

    /// Convert a hash to a hex string
    pub fn hash_to_hex(hash: &Hash) -> String {
        hex::encode(hash)
    }
}

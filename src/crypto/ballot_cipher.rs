//! Ballot payload encryption at rest
//!
//! AES-256-GCM with a random 96-bit nonce per ballot. The ciphertext is bound
//! to its `(principal, election)` row through the associated data, so a payload
//! copied onto another row fails to open.
//!
//! Envelope layout: `nonce (12) ∥ auth_tag (16) ∥ ciphertext`.

use crate::crypto::SecureMemory;
use crate::types::{ElectionId, PrincipalId};
use crate::{Result, crypto_error};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub struct BallotCipher {
    cipher: Aes256Gcm,
}

impl BallotCipher {
    pub fn new(key: &[u8; 32]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| crypto_error!("Invalid ballot key length"))?;
        Ok(Self { cipher })
    }

    pub fn for_testing() -> Self {
        let key = SecureMemory::secure_random_bytes::<32>();
        Self {
            cipher: Aes256Gcm::new(&key.into()),
        }
    }

    /// Encrypt `plaintext` for the given row
    pub fn seal(
        &self,
        principal_id: &PrincipalId,
        election_id: &ElectionId,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let nonce_bytes = SecureMemory::secure_random_bytes::<NONCE_LEN>();
        let aad = associated_data(principal_id, election_id);

        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| crypto_error!("Ballot encryption failed"))?;

        // aes-gcm appends the tag; move it in front of the ciphertext
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        let mut envelope = Vec::with_capacity(NONCE_LEN + TAG_LEN + ciphertext.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(tag);
        envelope.extend_from_slice(ciphertext);
        Ok(envelope)
    }

    /// Decrypt an envelope produced by [`BallotCipher::seal`] for the same row
    pub fn open(
        &self,
        principal_id: &PrincipalId,
        election_id: &ElectionId,
        envelope: &[u8],
    ) -> Result<Vec<u8>> {
        if envelope.len() < NONCE_LEN + TAG_LEN {
            return Err(crypto_error!(
                "Ballot envelope too short: {} bytes",
                envelope.len()
            ));
        }

        let (nonce_bytes, rest) = envelope.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let aad = associated_data(principal_id, election_id);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: &sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| crypto_error!("Ballot authentication failed"))
    }
}

fn associated_data(principal_id: &PrincipalId, election_id: &ElectionId) -> Vec<u8> {
    let mut aad = Vec::with_capacity(principal_id.as_str().len() + 17);
    aad.extend_from_slice(principal_id.as_str().as_bytes());
    aad.push(0x1f);
    aad.extend_from_slice(election_id.as_bytes());
    aad
}

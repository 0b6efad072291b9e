//! Six-digit login codes
//!
//! A principal has at most one live code. Codes are stored as a keyed digest
//! bound to the principal, compared in constant time, consumed on success and
//! kept on a wrong guess.

use crate::crypto::{SecureMemory, SecureSaltManager};
use crate::store::Datastore;
use crate::types::{OneTimeCode, PrincipalId};
use crate::{Error, Result};
use chrono::{Duration, Utc};
use rand::Rng;
use std::sync::Arc;

pub const CODE_LENGTH: usize = 6;

/// Outcome of presenting a code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpVerification {
    /// Code accepted and consumed
    Verified,
    /// Wrong code; the live code is untouched
    Retry,
    /// No live code (never issued, consumed, or expired); login must restart
    Expired,
}

pub struct OtpService {
    store: Arc<dyn Datastore>,
    salts: SecureSaltManager,
    ttl_seconds: u64,
}

impl OtpService {
    pub fn new(store: Arc<dyn Datastore>, salts: SecureSaltManager, ttl_seconds: u64) -> Self {
        Self {
            store,
            salts,
            ttl_seconds,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Generate a code for `principal`, replacing any previous one
    pub async fn issue(&self, principal: &PrincipalId) -> Result<String> {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));

        self.store
            .upsert_one_time_code(OneTimeCode {
                principal_id: principal.clone(),
                code_hash: self.salts.digest_one_time_code(principal, &code),
                expires_at: Utc::now() + Duration::seconds(self.ttl_seconds as i64),
            })
            .await?;

        tracing::debug!(principal = %principal, ttl_seconds = self.ttl_seconds, "Login code issued");
        Ok(code)
    }

    pub async fn verify(&self, principal: &PrincipalId, code: &str) -> Result<OtpVerification> {
        let code = code.trim();
        if code.len() != CODE_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_input("Login code must be exactly 6 digits"));
        }

        let Some(stored) = self.store.get_one_time_code(principal).await? else {
            return Ok(OtpVerification::Expired);
        };

        if stored.is_expired() {
            self.store.delete_one_time_code(principal).await?;
            tracing::info!(principal = %principal, "Expired login code removed");
            return Ok(OtpVerification::Expired);
        }

        let presented = self.salts.digest_one_time_code(principal, code);
        if !SecureMemory::constant_time_eq(&presented, &stored.code_hash) {
            tracing::info!(principal = %principal, "Wrong login code");
            return Ok(OtpVerification::Retry);
        }

        self.store.delete_one_time_code(principal).await?;
        Ok(OtpVerification::Verified)
    }
}

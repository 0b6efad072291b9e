//! # Core Types for the Election Core
//!
//! Data model shared by the biometric matcher, the escalation state machine and
//! the ballot guard. Rows of these types are persisted by whatever datastore
//! implements the [`crate::store`] traits.
//!
//! ## Type Categories
//!
//! ### Identity
//! - [`PrincipalId`]: opaque principal identifier
//! - [`Principal`]: account with role and lifecycle status
//!
//! ### Biometrics
//! - [`YawBin`]: coarse head-rotation class
//! - [`EnrollmentTemplate`]: the normalized embeddings enrolled for one principal
//! - [`VerificationEvent`]: append-only audit row for every biometric decision
//!
//! ### Voting
//! - [`OneTimeCode`]: the single live login code of a principal
//! - [`Ballot`]: the encrypted, immutable ballot of one principal in one election
//!
//! ## Usage Examples
//!
//! ```rust
//! use campus_vote::types::*;
//!
//! let principal = Principal {
//!     id: PrincipalId::new("2021-00417"),
//!     email: "jdelacruz@students.example.edu".to_string(),
//!     institution_id: Some("2021-00417".to_string()),
//!     role: Role::Voter,
//!     credential_hash: String::new(),
//!     approval_status: ApprovalStatus::Approved,
//!     account_status: AccountStatus::Active,
//! };
//!
//! assert!(principal.matches_identifier("2021-00417"));
//! assert!(principal.ensure_eligible_voter().is_ok());
//! ```

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Election identifier
pub type ElectionId = Uuid;

/// 32-byte BLAKE3 digest
pub type Hash = [u8; 32];

/// Opaque principal identifier
///
/// Student rows use their institution ID or a generated UUID string; the
/// environment-configured administrator uses a fixed id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Voter,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
    Graduating,
}

/// Account that can authenticate against the core
///
/// Created by administrative import or self-registration, mutated by approval
/// actions, soft-disabled through `account_status`. The core never deletes one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub institution_id: Option<String>,
    pub role: Role,
    /// Argon2id PHC string
    pub credential_hash: String,
    pub approval_status: ApprovalStatus,
    pub account_status: AccountStatus,
}

impl Principal {
    /// Whether a login identifier (email or institution ID) names this principal
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.matches_email(identifier) || self.matches_institution_id(identifier)
    }

    /// Case-insensitive email comparison
    pub fn matches_email(&self, identifier: &str) -> bool {
        self.email.eq_ignore_ascii_case(identifier.trim())
    }

    pub fn matches_institution_id(&self, identifier: &str) -> bool {
        let identifier = identifier.trim();
        self.institution_id
            .as_deref()
            .is_some_and(|id| id == identifier)
    }

    /// Reject voters whose registration or account status forbids login
    pub fn ensure_eligible_voter(&self) -> Result<()> {
        match self.approval_status {
            ApprovalStatus::Pending => {
                return Err(Error::forbidden(
                    "Your registration is still pending approval",
                ));
            }
            ApprovalStatus::Declined => {
                return Err(Error::forbidden("Your registration was declined"));
            }
            ApprovalStatus::Approved => {}
        }

        match self.account_status {
            AccountStatus::Active => Ok(()),
            AccountStatus::Inactive => Err(Error::forbidden("Your account is inactive")),
            AccountStatus::Graduating => Err(Error::forbidden(
                "Your account is marked as graduating and can no longer vote",
            )),
        }
    }
}

/// Coarse head-rotation class of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YawBin {
    Left,
    Center,
    Right,
}

impl YawBin {
    /// Classify a yaw estimate in degrees; negative is the subject's left
    pub fn classify(yaw_degrees: f32, center_half_width: f32) -> Self {
        if yaw_degrees < -center_half_width {
            YawBin::Left
        } else if yaw_degrees > center_half_width {
            YawBin::Right
        } else {
            YawBin::Center
        }
    }
}

/// One stored embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSample {
    /// L2-normalized descriptor
    pub vector: Vec<f32>,
    pub yaw_bin: Option<YawBin>,
}

/// Enrolled embeddings of one principal
///
/// One template set per principal. Re-enrollment replaces the whole set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentTemplate {
    pub principal_id: PrincipalId,
    pub samples: Vec<TemplateSample>,
    pub enrolled_at: DateTime<Utc>,
}

impl EnrollmentTemplate {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Samples in `bin`, or every sample when that bin has none
    pub fn samples_for_bin(&self, bin: Option<YawBin>) -> Vec<&TemplateSample> {
        if let Some(bin) = bin {
            let binned: Vec<&TemplateSample> = self
                .samples
                .iter()
                .filter(|sample| sample.yaw_bin == Some(bin))
                .collect();
            if !binned.is_empty() {
                return binned;
            }
        }
        self.samples.iter().collect()
    }
}

/// Live login code of a principal (at most one per principal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneTimeCode {
    pub principal_id: PrincipalId,
    /// Keyed BLAKE3 digest of the code
    pub code_hash: [u8; 32],
    pub expires_at: DateTime<Utc>,
}

impl OneTimeCode {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Ballot choices: position identifier to selected candidate identifiers
pub type Selections = BTreeMap<String, Vec<String>>;

/// Encrypted ballot
///
/// Created exactly once per `(principal_id, election_id)`; never updated or
/// deleted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    pub ballot_id: Uuid,
    pub principal_id: PrincipalId,
    pub election_id: ElectionId,
    /// `nonce ∥ auth_tag ∥ ciphertext`
    #[serde(with = "serde_bytes")]
    pub encrypted_payload: Vec<u8>,
    pub cast_at: DateTime<Utc>,
}

/// Which flow produced a biometric decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationSource {
    Enrollment,
    Login,
    Voting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationDecision {
    Enrolled,
    DuplicateRejected,
    Match,
    NoMatch,
    CrossAccountMatch,
}

/// Request metadata attached to audit rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientContext {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Audit row for one biometric decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationEvent {
    pub event_id: Uuid,
    pub principal_id: PrincipalId,
    pub election_id: Option<ElectionId>,
    pub decision: VerificationDecision,
    pub best_score: f32,
    pub median_score: f32,
    pub threshold: f32,
    pub source: VerificationSource,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

//! Datastore capability
//!
//! The core reads and writes rows through [`Datastore`]; it never talks to a
//! database directly. [`MemoryStore`] is the in-process implementation used by
//! tests and single-node deployments.

pub mod memory;

use crate::Result;
use crate::crypto::AuditRecord;
use crate::types::{Ballot, ElectionId, EnrollmentTemplate, OneTimeCode, Principal, PrincipalId};
use async_trait::async_trait;

pub use memory::MemoryStore;

#[async_trait]
pub trait Datastore: Send + Sync {
    /// Look up a principal by email (case-insensitive), then by institution ID
    async fn find_principal_by_identifier(&self, identifier: &str) -> Result<Option<Principal>>;

    async fn get_principal(&self, id: &PrincipalId) -> Result<Option<Principal>>;

    async fn get_template(&self, id: &PrincipalId) -> Result<Option<EnrollmentTemplate>>;

    /// Every enrolled template except the one owned by `id`
    async fn templates_except(&self, id: &PrincipalId) -> Result<Vec<EnrollmentTemplate>>;

    /// Store `template`, discarding any previous template of its principal
    async fn replace_template(&self, template: EnrollmentTemplate) -> Result<()>;

    /// Store `code` as the principal's only live code (last writer wins)
    async fn upsert_one_time_code(&self, code: OneTimeCode) -> Result<()>;

    async fn get_one_time_code(&self, id: &PrincipalId) -> Result<Option<OneTimeCode>>;

    async fn delete_one_time_code(&self, id: &PrincipalId) -> Result<()>;

    async fn has_ballot(&self, principal: &PrincipalId, election: &ElectionId) -> Result<bool>;

    /// Insert `ballot` unless one exists for its `(principal, election)`
    ///
    /// Check and insert are atomic; the losing writer gets `Conflict`.
    async fn insert_ballot_unique(&self, ballot: Ballot) -> Result<()>;

    async fn get_ballot(
        &self,
        principal: &PrincipalId,
        election: &ElectionId,
    ) -> Result<Option<Ballot>>;

    async fn append_audit_record(&self, record: AuditRecord) -> Result<()>;

    async fn last_audit_record(&self) -> Result<Option<AuditRecord>>;

    /// Every audit record in sequence order
    async fn audit_records(&self) -> Result<Vec<AuditRecord>>;
}

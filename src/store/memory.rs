//! In-memory datastore

use crate::crypto::AuditRecord;
use crate::store::Datastore;
use crate::types::{Ballot, ElectionId, EnrollmentTemplate, OneTimeCode, Principal, PrincipalId};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
pub struct MemoryStore {
    principals: RwLock<HashMap<PrincipalId, Principal>>,
    templates: RwLock<HashMap<PrincipalId, EnrollmentTemplate>>,
    codes: RwLock<HashMap<PrincipalId, OneTimeCode>>,
    ballots: RwLock<HashMap<(PrincipalId, ElectionId), Ballot>>,
    audit: RwLock<Vec<AuditRecord>>,
    audit_unavailable: AtomicBool,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| Error::unavailable("datastore", "read lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| Error::unavailable("datastore", "write lock poisoned"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a principal row
    pub fn insert_principal(&self, principal: Principal) -> Result<()> {
        write(&self.principals)?.insert(principal.id.clone(), principal);
        Ok(())
    }

    /// Make audit appends fail, as an unreachable audit table would
    pub fn set_audit_unavailable(&self, unavailable: bool) {
        self.audit_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn ballot_count(&self) -> Result<usize> {
        Ok(read(&self.ballots)?.len())
    }

    pub fn template_count(&self) -> Result<usize> {
        Ok(read(&self.templates)?.len())
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn find_principal_by_identifier(&self, identifier: &str) -> Result<Option<Principal>> {
        let principals = read(&self.principals)?;
        let by_email = principals
            .values()
            .find(|principal| principal.matches_email(identifier));
        Ok(by_email
            .or_else(|| {
                principals
                    .values()
                    .find(|principal| principal.matches_institution_id(identifier))
            })
            .cloned())
    }

    async fn get_principal(&self, id: &PrincipalId) -> Result<Option<Principal>> {
        Ok(read(&self.principals)?.get(id).cloned())
    }

    async fn get_template(&self, id: &PrincipalId) -> Result<Option<EnrollmentTemplate>> {
        Ok(read(&self.templates)?.get(id).cloned())
    }

    async fn templates_except(&self, id: &PrincipalId) -> Result<Vec<EnrollmentTemplate>> {
        let templates = read(&self.templates)?;
        Ok(templates
            .values()
            .filter(|template| &template.principal_id != id)
            .cloned()
            .collect())
    }

    async fn replace_template(&self, template: EnrollmentTemplate) -> Result<()> {
        write(&self.templates)?.insert(template.principal_id.clone(), template);
        Ok(())
    }

    async fn upsert_one_time_code(&self, code: OneTimeCode) -> Result<()> {
        write(&self.codes)?.insert(code.principal_id.clone(), code);
        Ok(())
    }

    async fn get_one_time_code(&self, id: &PrincipalId) -> Result<Option<OneTimeCode>> {
        Ok(read(&self.codes)?.get(id).cloned())
    }

    async fn delete_one_time_code(&self, id: &PrincipalId) -> Result<()> {
        write(&self.codes)?.remove(id);
        Ok(())
    }

    async fn has_ballot(&self, principal: &PrincipalId, election: &ElectionId) -> Result<bool> {
        Ok(read(&self.ballots)?.contains_key(&(principal.clone(), *election)))
    }

    async fn insert_ballot_unique(&self, ballot: Ballot) -> Result<()> {
        let key = (ballot.principal_id.clone(), ballot.election_id);

        // One write guard spans the check and the insert
        let mut ballots = write(&self.ballots)?;
        if let Some(existing) = ballots.get(&key) {
            return Err(Error::conflict(format!(
                "A ballot was already cast for this election at {}",
                existing.cast_at.to_rfc3339()
            )));
        }
        ballots.insert(key, ballot);
        Ok(())
    }

    async fn get_ballot(
        &self,
        principal: &PrincipalId,
        election: &ElectionId,
    ) -> Result<Option<Ballot>> {
        Ok(read(&self.ballots)?
            .get(&(principal.clone(), *election))
            .cloned())
    }

    async fn append_audit_record(&self, record: AuditRecord) -> Result<()> {
        if self.audit_unavailable.load(Ordering::SeqCst) {
            return Err(Error::unavailable("datastore", "audit table unreachable"));
        }
        write(&self.audit)?.push(record);
        Ok(())
    }

    async fn last_audit_record(&self) -> Result<Option<AuditRecord>> {
        Ok(read(&self.audit)?.last().cloned())
    }

    async fn audit_records(&self) -> Result<Vec<AuditRecord>> {
        Ok(read(&self.audit)?.clone())
    }
}

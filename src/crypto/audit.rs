//! Tamper-evident audit trail for biometric decisions
//!
//! Every [`VerificationEvent`] is wrapped in an [`AuditRecord`] that carries a
//! monotonically increasing sequence number, the BLAKE3 hash of the previous
//! record and the hash of its own content. Rewriting or dropping a row breaks
//! the chain at that point.
//!
//! Writing is best effort: a failed append is logged and never fails the
//! decision it describes.

use crate::crypto::{CryptoUtils, SecureMemory};
use crate::store::Datastore;
use crate::types::{Hash, VerificationEvent};
use crate::{Result, crypto_error};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Position in the trail, starting at 1
    pub sequence_number: u64,

    /// Hash of the previous record (None for the first record)
    pub previous_hash: Option<Hash>,

    /// Hash of `event`
    pub content_hash: Hash,

    pub event: VerificationEvent,
}

impl AuditRecord {
    pub fn new(
        sequence_number: u64,
        previous_hash: Option<Hash>,
        event: VerificationEvent,
    ) -> Result<Self> {
        let content_hash = Self::content_hash_of(&event)?;
        Ok(Self {
            sequence_number,
            previous_hash,
            content_hash,
            event,
        })
    }

    fn content_hash_of(event: &VerificationEvent) -> Result<Hash> {
        let content = serde_json::to_vec(event)
            .map_err(|e| crypto_error!("Failed to serialize audit content: {}", e))?;
        Ok(CryptoUtils::hash(&content))
    }

    /// Hash of the whole record, chained into the next one
    pub fn record_hash(&self) -> Result<Hash> {
        let content = serde_json::to_vec(self)
            .map_err(|e| crypto_error!("Failed to serialize audit record: {}", e))?;
        Ok(CryptoUtils::hash(&content))
    }

    /// Whether `content_hash` still matches `event`
    pub fn verify_integrity(&self) -> Result<bool> {
        let expected = Self::content_hash_of(&self.event)?;
        Ok(SecureMemory::constant_time_eq(&self.content_hash, &expected))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntegrityViolationType {
    ContentHashMismatch,
    HashChainBroken,
    SequenceGap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditIntegrityViolation {
    pub event_id: Uuid,
    pub sequence_number: u64,
    pub violation_type: IntegrityViolationType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditIntegrityReport {
    pub total_records_checked: usize,
    pub violations: Vec<AuditIntegrityViolation>,
    pub hash_chain_valid: bool,
}

/// Walk `records` in order and report every broken link
pub fn verify_chain(records: &[AuditRecord]) -> Result<AuditIntegrityReport> {
    let mut violations = Vec::new();
    let mut previous_hash: Option<Hash> = None;
    let mut expected_sequence = 1u64;

    for record in records {
        let mut flag = |violation_type| {
            violations.push(AuditIntegrityViolation {
                event_id: record.event.event_id,
                sequence_number: record.sequence_number,
                violation_type,
            })
        };

        if !record.verify_integrity()? {
            flag(IntegrityViolationType::ContentHashMismatch);
        }
        if record.previous_hash != previous_hash {
            flag(IntegrityViolationType::HashChainBroken);
        }
        if record.sequence_number != expected_sequence {
            flag(IntegrityViolationType::SequenceGap);
        }

        previous_hash = Some(record.record_hash()?);
        expected_sequence = record.sequence_number + 1;
    }

    Ok(AuditIntegrityReport {
        total_records_checked: records.len(),
        hash_chain_valid: violations.is_empty(),
        violations,
    })
}

/// Head of the chain as last written by this process
#[derive(Debug, Default)]
struct ChainHead {
    loaded: bool,
    sequence_number: u64,
    record_hash: Option<Hash>,
}

/// Appends verification events to the datastore as a hash chain
pub struct VerificationAuditor {
    store: Arc<dyn Datastore>,
    head: Mutex<ChainHead>,
}

impl VerificationAuditor {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self {
            store,
            head: Mutex::new(ChainHead::default()),
        }
    }

    /// Record `event`; failures are logged and swallowed
    pub async fn record(&self, event: VerificationEvent) {
        let event_id = event.event_id;
        let principal = event.principal_id.clone();
        let decision = event.decision;

        if let Err(e) = self.append(event).await {
            tracing::warn!(
                event_id = %event_id,
                principal = %principal,
                decision = ?decision,
                error = %e,
                "Failed to record verification event"
            );
        }
    }

    async fn append(&self, event: VerificationEvent) -> Result<()> {
        // Held across the write so sequence numbers stay gapless
        let mut head = self.head.lock().await;

        if !head.loaded {
            if let Some(last) = self.store.last_audit_record().await? {
                head.sequence_number = last.sequence_number;
                head.record_hash = Some(last.record_hash()?);
            }
            head.loaded = true;
        }

        let record = AuditRecord::new(head.sequence_number + 1, head.record_hash, event)?;
        let record_hash = record.record_hash()?;
        let sequence_number = record.sequence_number;

        self.store.append_audit_record(record).await?;

        head.sequence_number = sequence_number;
        head.record_hash = Some(record_hash);

        tracing::debug!(sequence_number, "Verification event recorded");
        Ok(())
    }

    /// Check the stored trail end to end
    pub async fn verify_integrity(&self) -> Result<AuditIntegrityReport> {
        let records = self.store.audit_records().await?;
        let report = verify_chain(&records)?;

        if !report.hash_chain_valid {
            tracing::error!(
                violations = report.violations.len(),
                "🚨 Verification audit trail integrity violation"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{PrincipalId, VerificationDecision, VerificationSource};
    use chrono::Utc;

    fn event(decision: VerificationDecision) -> VerificationEvent {
        VerificationEvent {
            event_id: Uuid::new_v4(),
            principal_id: PrincipalId::new("2021-0007"),
            election_id: None,
            decision,
            best_score: 0.91,
            median_score: 0.88,
            threshold: 0.80,
            source: VerificationSource::Login,
            client_ip: Some("10.0.0.8".to_string()),
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_integrity() {
        let record = AuditRecord::new(1, None, event(VerificationDecision::Match)).unwrap();
        assert!(record.verify_integrity().unwrap());

        let mut tampered = record.clone();
        tampered.event.best_score = 0.99;
        assert!(!tampered.verify_integrity().unwrap());
    }

    #[test]
    fn test_chain_detects_broken_link() {
        let first = AuditRecord::new(1, None, event(VerificationDecision::Match)).unwrap();
        let second = AuditRecord::new(
            2,
            Some(first.record_hash().unwrap()),
            event(VerificationDecision::NoMatch),
        )
        .unwrap();
        let third = AuditRecord::new(
            3,
            Some(second.record_hash().unwrap()),
            event(VerificationDecision::Match),
        )
        .unwrap();

        let report = verify_chain(&[first.clone(), second, third.clone()]).unwrap();
        assert!(report.hash_chain_valid);
        assert_eq!(report.total_records_checked, 3);

        // Dropping the middle record breaks the link and the sequence
        let report = verify_chain(&[first, third]).unwrap();
        assert!(!report.hash_chain_valid);
        assert!(
            report
                .violations
                .iter()
                .any(|v| v.violation_type == IntegrityViolationType::HashChainBroken)
        );
        assert!(
            report
                .violations
                .iter()
                .any(|v| v.violation_type == IntegrityViolationType::SequenceGap)
        );
    }

    #[tokio::test]
    async fn test_auditor_chains_through_store() {
        let store = Arc::new(MemoryStore::new());
        let auditor = VerificationAuditor::new(store.clone());

        auditor.record(event(VerificationDecision::Enrolled)).await;
        auditor.record(event(VerificationDecision::Match)).await;
        auditor.record(event(VerificationDecision::NoMatch)).await;

        let records = store.audit_records().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].sequence_number, 3);

        let report = auditor.verify_integrity().await.unwrap();
        assert!(report.hash_chain_valid);

        // A second auditor over the same store continues the chain
        let resumed = VerificationAuditor::new(store.clone());
        resumed.record(event(VerificationDecision::Match)).await;
        assert!(resumed.verify_integrity().await.unwrap().hash_chain_valid);
    }
}

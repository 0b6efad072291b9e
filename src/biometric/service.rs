//! Enrollment and verification against the template store
//!
//! Every decision taken here is written to the verification audit trail.

use crate::biometric::liveness::{AdmittedProbe, CaptureSignals, FaceCapture, LivenessGate, ProbeSample};
use crate::biometric::matcher::{CandidateScore, MatchReport, TemplateMatcher};
use crate::crypto::VerificationAuditor;
use crate::store::Datastore;
use crate::types::{
    ClientContext, ElectionId, EnrollmentTemplate, PrincipalId, VerificationDecision,
    VerificationEvent, VerificationSource,
};
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Accepted enrollment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentOutcome {
    pub samples_stored: usize,
    pub candidates_scanned: usize,
    /// Other principals scoring at or above the suspicion floor
    pub suspicious_matches: usize,
}

/// Where a verification happens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationPurpose {
    Login,
    /// Proof of the current face before a template is replaced
    Reenrollment,
    Voting { election_id: ElectionId },
}

impl VerificationPurpose {
    fn source(&self) -> VerificationSource {
        match self {
            Self::Login => VerificationSource::Login,
            Self::Reenrollment => VerificationSource::Enrollment,
            Self::Voting { .. } => VerificationSource::Voting,
        }
    }

    fn election_id(&self) -> Option<ElectionId> {
        match self {
            Self::Login | Self::Reenrollment => None,
            Self::Voting { election_id } => Some(*election_id),
        }
    }
}

pub struct BiometricService {
    store: Arc<dyn Datastore>,
    matcher: TemplateMatcher,
    gate: LivenessGate,
    auditor: Arc<VerificationAuditor>,
}

impl BiometricService {
    pub fn new(
        store: Arc<dyn Datastore>,
        matcher: TemplateMatcher,
        gate: LivenessGate,
        auditor: Arc<VerificationAuditor>,
    ) -> Self {
        Self {
            store,
            matcher,
            gate,
            auditor,
        }
    }

    pub fn matcher(&self) -> &TemplateMatcher {
        &self.matcher
    }

    pub fn auditor(&self) -> &Arc<VerificationAuditor> {
        &self.auditor
    }

    /// Run the liveness gate over a capture
    pub fn admit(
        &self,
        signals: Option<&CaptureSignals>,
        samples: Vec<ProbeSample>,
    ) -> Result<AdmittedProbe> {
        self.gate.admit(signals, samples)
    }

    /// Run the liveness gate over a whole capture
    pub fn admit_capture(&self, capture: FaceCapture) -> Result<AdmittedProbe> {
        self.gate.admit(capture.signals.as_ref(), capture.samples)
    }

    /// Enroll `probe` as `principal`'s template unless it duplicates another account
    pub async fn enroll(
        &self,
        principal: &PrincipalId,
        probe: &AdmittedProbe,
        client: &ClientContext,
    ) -> Result<EnrollmentOutcome> {
        let samples = self.matcher.prepare(probe)?;
        let others = self.store.templates_except(principal).await?;
        let assessment = self.matcher.assess_duplicates(&samples, &others, principal);

        if let Some(duplicate) = &assessment.duplicate_of {
            tracing::warn!(
                principal = %principal,
                existing = %duplicate.principal_id,
                max = duplicate.max,
                avg = duplicate.avg,
                strong_pairs = duplicate.strong_pairs,
                "🚫 Duplicate face enrollment rejected"
            );
            self.record(
                principal,
                VerificationDecision::DuplicateRejected,
                Some(duplicate),
                self.matcher.config().duplicate_threshold,
                VerificationSource::Enrollment,
                None,
                client,
            )
            .await;
            return Err(Error::conflict(
                "This face is already enrolled to another account",
            ));
        }

        for suspect in &assessment.suspicious {
            tracing::warn!(
                principal = %principal,
                similar_to = %suspect.principal_id,
                max = suspect.max,
                avg = suspect.avg,
                "Enrollment resembles another account"
            );
        }

        let strongest = assessment
            .suspicious
            .iter()
            .max_by(|a, b| a.max.total_cmp(&b.max));

        let samples_stored = samples.len();
        self.store
            .replace_template(EnrollmentTemplate {
                principal_id: principal.clone(),
                samples,
                enrolled_at: Utc::now(),
            })
            .await?;

        self.record(
            principal,
            VerificationDecision::Enrolled,
            strongest,
            self.matcher.config().duplicate_threshold,
            VerificationSource::Enrollment,
            None,
            client,
        )
        .await;

        tracing::info!(principal = %principal, samples = samples_stored, "📸 Face enrolled");

        Ok(EnrollmentOutcome {
            samples_stored,
            candidates_scanned: assessment.candidates_scanned,
            suspicious_matches: assessment.suspicious.len(),
        })
    }

    /// Verify `probe` against `principal`'s own template
    ///
    /// A probe that does not match its caller but does match another account is
    /// a `Conflict`.
    pub async fn verify(
        &self,
        principal: &PrincipalId,
        probe: &AdmittedProbe,
        purpose: VerificationPurpose,
        client: &ClientContext,
    ) -> Result<MatchReport> {
        let samples = self.matcher.prepare(probe)?;
        let own = self.store.get_template(principal).await?;
        let report = self.matcher.verify(&samples, own.as_ref());

        let threshold = report.threshold;
        let source = purpose.source();
        let election_id = purpose.election_id();

        if report.matched {
            self.record_report(principal, VerificationDecision::Match, &report, source, election_id, client)
                .await;
            tracing::info!(principal = %principal, best = report.best, source = ?source, "✅ Face matched");
            return Ok(report);
        }

        let others = self.store.templates_except(principal).await?;
        let assessment = self.matcher.assess_duplicates(&samples, &others, principal);

        if let Some(other) = &assessment.duplicate_of {
            tracing::warn!(
                principal = %principal,
                matched_account = %other.principal_id,
                max = other.max,
                source = ?source,
                "🚨 Face matched a different account"
            );
            self.record(
                principal,
                VerificationDecision::CrossAccountMatch,
                Some(other),
                threshold,
                source,
                election_id,
                client,
            )
            .await;
            return Err(Error::conflict("This face is enrolled to a different account"));
        }

        self.record_report(principal, VerificationDecision::NoMatch, &report, source, election_id, client)
            .await;
        tracing::info!(
            principal = %principal,
            best = report.best,
            compared = report.compared,
            source = ?source,
            "Face did not match"
        );

        Ok(report)
    }

    async fn record_report(
        &self,
        principal: &PrincipalId,
        decision: VerificationDecision,
        report: &MatchReport,
        source: VerificationSource,
        election_id: Option<ElectionId>,
        client: &ClientContext,
    ) {
        self.auditor
            .record(event(
                principal,
                decision,
                report.best,
                report.median,
                report.threshold,
                source,
                election_id,
                client,
            ))
            .await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        principal: &PrincipalId,
        decision: VerificationDecision,
        score: Option<&CandidateScore>,
        threshold: f32,
        source: VerificationSource,
        election_id: Option<ElectionId>,
        client: &ClientContext,
    ) {
        let (best, median) = score.map(|s| (s.max, s.median)).unwrap_or_default();
        self.auditor
            .record(event(
                principal,
                decision,
                best,
                median,
                threshold,
                source,
                election_id,
                client,
            ))
            .await;
    }
}

#[allow(clippy::too_many_arguments)]
fn event(
    principal: &PrincipalId,
    decision: VerificationDecision,
    best_score: f32,
    median_score: f32,
    threshold: f32,
    source: VerificationSource,
    election_id: Option<ElectionId>,
    client: &ClientContext,
) -> VerificationEvent {
    VerificationEvent {
        event_id: Uuid::new_v4(),
        principal_id: principal.clone(),
        election_id,
        decision,
        best_score,
        median_score,
        threshold,
        source,
        client_ip: client.client_ip.clone(),
        user_agent: client.user_agent.clone(),
        created_at: Utc::now(),
    }
}

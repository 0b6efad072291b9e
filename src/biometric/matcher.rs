//! Template matching and duplicate detection
//!
//! Pure functions over normalized descriptors. The store, audit trail and
//! escalation logic live in [`crate::biometric::service`].

use crate::biometric::liveness::AdmittedProbe;
use crate::biometric::vector::{self, ScoreSummary};
use crate::types::{EnrollmentTemplate, PrincipalId, TemplateSample, YawBin};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Descriptor length produced by the capture client
    pub dimension: usize,

    /// Best score at or above which a verification is accepted
    pub match_threshold: f32,

    /// Pair score that counts as a strong duplicate signal
    pub duplicate_threshold: f32,

    /// Average score that corroborates a strong pair
    pub corroboration_floor: f32,

    /// Samples both sides need before corroboration applies
    pub min_duplicate_samples: usize,

    /// Strong pairs that reject on their own
    pub strong_pair_count: usize,

    /// Single pair score that rejects on its own
    pub strict_ceiling: f32,

    /// Score from which a cross-account match is logged
    pub suspicion_floor: f32,

    /// Yaw (degrees) either side of zero still classified as center
    pub yaw_center_half_width: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            dimension: 128,
            match_threshold: 0.80,
            duplicate_threshold: 0.90,
            corroboration_floor: 0.85,
            min_duplicate_samples: 3,
            strong_pair_count: 3,
            strict_ceiling: 0.97,
            suspicion_floor: 0.80,
            yaw_center_half_width: 12.0,
        }
    }
}

impl MatcherConfig {
    /// Reject threshold sets under which a duplicate could pass verification
    pub fn validate(&self) -> Result<()> {
        let in_range = |value: f32| value > 0.0 && value <= 1.0;

        if self.dimension == 0 {
            return Err(Error::internal("Descriptor dimension must be positive"));
        }
        for (name, value) in [
            ("match threshold", self.match_threshold),
            ("duplicate threshold", self.duplicate_threshold),
            ("corroboration floor", self.corroboration_floor),
            ("strict ceiling", self.strict_ceiling),
            ("suspicion floor", self.suspicion_floor),
        ] {
            if !in_range(value) {
                return Err(Error::internal(format!("Face {name} must be in (0, 1]")));
            }
        }
        if self.match_threshold >= self.duplicate_threshold
            || self.match_threshold >= self.corroboration_floor
        {
            return Err(Error::internal(
                "Face match threshold must be below every duplicate threshold",
            ));
        }
        if self.duplicate_threshold > self.strict_ceiling {
            return Err(Error::internal(
                "Face duplicate threshold must not exceed the strict ceiling",
            ));
        }
        if self.strong_pair_count == 0 || !self.yaw_center_half_width.is_finite() {
            return Err(Error::internal("Invalid face matcher configuration"));
        }
        Ok(())
    }
}

/// Pairwise scores of a probe against one other principal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub principal_id: PrincipalId,
    pub max: f32,
    pub avg: f32,
    pub median: f32,
    pub strong_pairs: usize,
    pub candidate_samples: usize,
}

/// Result of scanning other principals for a duplicate of a probe
#[derive(Debug, Clone, Default)]
pub struct DuplicateAssessment {
    /// First candidate meeting the rejection rule
    pub duplicate_of: Option<CandidateScore>,
    /// Candidates at or above the suspicion floor that were not rejected
    pub suspicious: Vec<CandidateScore>,
    pub candidates_scanned: usize,
}

impl DuplicateAssessment {
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

/// Outcome of verifying a probe against the caller's own template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    #[serde(rename = "match")]
    pub matched: bool,
    pub best: f32,
    pub median: f32,
    pub mean: f32,
    pub threshold: f32,
    pub compared: usize,
}

pub struct TemplateMatcher {
    config: MatcherConfig,
}

impl TemplateMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Validate, normalize and yaw-bin every sample of an admitted probe
    pub fn prepare(&self, probe: &AdmittedProbe) -> Result<Vec<TemplateSample>> {
        probe
            .samples()
            .iter()
            .map(|sample| {
                vector::validate(&sample.embedding, self.config.dimension)?;
                Ok(TemplateSample {
                    vector: vector::normalize(&sample.embedding),
                    yaw_bin: sample
                        .yaw
                        .filter(|yaw| yaw.is_finite())
                        .map(|yaw| YawBin::classify(yaw, self.config.yaw_center_half_width)),
                })
            })
            .collect()
    }

    /// Score `probe` against one candidate template
    pub fn score_candidate(
        &self,
        probe: &[TemplateSample],
        candidate: &EnrollmentTemplate,
    ) -> CandidateScore {
        let scores: Vec<f32> = probe
            .iter()
            .flat_map(|p| {
                candidate
                    .samples
                    .iter()
                    .map(move |c| vector::cosine_similarity(&p.vector, &c.vector))
            })
            .collect();

        let summary = ScoreSummary::from_scores(&scores);
        CandidateScore {
            principal_id: candidate.principal_id.clone(),
            max: summary.best,
            avg: summary.mean,
            median: summary.median,
            strong_pairs: scores
                .iter()
                .filter(|score| **score >= self.config.duplicate_threshold)
                .count(),
            candidate_samples: candidate.sample_count(),
        }
    }

    /// Whether a candidate's scores meet the duplicate rejection rule
    pub fn is_duplicate(&self, probe_samples: usize, score: &CandidateScore) -> bool {
        let config = &self.config;

        let corroborated = score.max >= config.duplicate_threshold
            && score.avg >= config.corroboration_floor
            && probe_samples >= config.min_duplicate_samples
            && score.candidate_samples >= config.min_duplicate_samples;

        corroborated
            || score.strong_pairs >= config.strong_pair_count
            || score.max >= config.strict_ceiling
    }

    /// Scan every template not owned by `exclude` for a duplicate of `probe`
    pub fn assess_duplicates(
        &self,
        probe: &[TemplateSample],
        candidates: &[EnrollmentTemplate],
        exclude: &PrincipalId,
    ) -> DuplicateAssessment {
        let mut assessment = DuplicateAssessment::default();

        for candidate in candidates.iter().filter(|c| &c.principal_id != exclude) {
            assessment.candidates_scanned += 1;
            let score = self.score_candidate(probe, candidate);

            if self.is_duplicate(probe.len(), &score) {
                assessment.duplicate_of = Some(score);
                break;
            }
            if score.max >= self.config.suspicion_floor {
                assessment.suspicious.push(score);
            }
        }

        assessment
    }

    /// Compare `probe` against the caller's own template
    ///
    /// A probe sample with a yaw bin is only compared with stored samples of the
    /// same bin unless that bin is empty. No template means no match.
    pub fn verify(
        &self,
        probe: &[TemplateSample],
        template: Option<&EnrollmentTemplate>,
    ) -> MatchReport {
        let mut scores = Vec::new();

        if let Some(template) = template {
            for p in probe {
                for stored in template.samples_for_bin(p.yaw_bin) {
                    scores.push(vector::cosine_similarity(&p.vector, &stored.vector));
                }
            }
        }

        let summary = ScoreSummary::from_scores(&scores);
        MatchReport {
            matched: summary.count > 0 && summary.best >= self.config.match_threshold,
            best: summary.best,
            median: summary.median,
            mean: summary.mean,
            threshold: self.config.match_threshold,
            compared: summary.count,
        }
    }
}

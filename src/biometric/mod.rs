//! Face template matching
//!
//! 1. [`liveness`] admits a capture once a blink or head turn was observed
//! 2. [`matcher`] normalizes descriptors and scores them
//! 3. [`service`] applies enrollment deduplication and verification against
//!    the store, auditing every decision

pub mod liveness;
pub mod matcher;
pub mod service;
pub mod vector;

pub use liveness::{
    AdmittedProbe, CaptureSignals, FaceCapture, LivenessConfig, LivenessCue, LivenessGate, LivenessVerdict,
    ProbeSample, TimedSample,
};
pub use matcher::{CandidateScore, DuplicateAssessment, MatchReport, MatcherConfig, TemplateMatcher};
pub use service::{BiometricService, EnrollmentOutcome, VerificationPurpose};
pub use vector::{ScoreSummary, cosine_similarity, normalize};

//! Password, login code and face escalation

pub mod escalation;
pub mod otp;

pub use escalation::{
    ENV_ADMIN_ID, EnrollmentGrant, EscalationService, FaceLoginOutcome, FaceVoteOutcome,
    LoginOutcome, OtpStep, PreAuthGrant,
};
pub use otp::{OtpService, OtpVerification};

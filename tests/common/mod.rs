//! Fixtures shared by the integration suites

#![allow(dead_code)]

use campus_vote::{
    AppContext, Result,
    auth::{LoginOutcome, OtpStep},
    biometric::FaceCapture,
    config::Config,
    crypto::SelectionTarget,
    notify::MemoryNotifier,
    store::MemoryStore,
    types::{AccountStatus, ApprovalStatus, ClientContext, Principal, PrincipalId, Role},
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

pub const PASSWORD: &str = "correct horse battery staple";
pub const DIMENSION: usize = 128;

pub struct Harness {
    pub app: Arc<AppContext>,
    pub store: Arc<MemoryStore>,
    pub outbox: Arc<MemoryNotifier>,
}

impl Harness {
    pub fn new() -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(MemoryNotifier::new());
        let app = Arc::new(AppContext::for_testing(store.clone(), outbox.clone())?);
        Ok(Self { app, store, outbox })
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let outbox = Arc::new(MemoryNotifier::new());
        let app = Arc::new(AppContext::new(config, store.clone(), outbox.clone())?);
        Ok(Self { app, store, outbox })
    }

    /// Seed an approved, active principal whose password is [`PASSWORD`]
    pub fn add_principal(&self, id: &str, role: Role) -> Result<Principal> {
        self.add_principal_with(id, role, ApprovalStatus::Approved, AccountStatus::Active)
    }

    pub fn add_principal_with(
        &self,
        id: &str,
        role: Role,
        approval_status: ApprovalStatus,
        account_status: AccountStatus,
    ) -> Result<Principal> {
        let principal = Principal {
            id: PrincipalId::new(id),
            email: email_of(id),
            institution_id: Some(id.to_string()),
            role,
            credential_hash: self.app.passwords.hash(PASSWORD)?,
            approval_status,
            account_status,
        };
        self.store.insert_principal(principal.clone())?;
        Ok(principal)
    }

    /// Drive a voter from password to a pre-authorization token
    pub async fn pre_authorize(&self, id: &str) -> Result<(String, bool)> {
        let pending = match self.app.escalation.login(id, PASSWORD).await? {
            LoginOutcome::OtpRequired { pending, .. } => pending,
            LoginOutcome::Session { .. } => panic!("voters must go through the login code"),
        };

        let code = self
            .mailed_code(&email_of(id))
            .expect("login code mailed");

        let selection = match self.app.escalation.verify_otp(&pending.token, &code).await? {
            OtpStep::Verified { selection, target } => {
                assert_eq!(target, SelectionTarget::VoterPreAuth);
                selection
            }
            other => panic!("expected verified code, got {other:?}"),
        };

        let grant = self
            .app
            .escalation
            .escalate_to_voter_pre_auth(&selection.token)
            .await?;
        Ok((grant.pre_auth.token, grant.has_face))
    }

    /// Drive a voter all the way to an enrolled face and a session token
    pub async fn enrolled_session(&self, id: &str, person: u64) -> Result<String> {
        let (pre_auth, _) = self.pre_authorize(id).await?;
        let grant = self
            .app
            .escalation
            .enroll_face(
                &pre_auth,
                FaceCapture::from_embeddings(captures(person), None),
                &ClientContext::default(),
            )
            .await?;
        Ok(grant.session.token)
    }

    /// Login code most recently mailed to `email`
    pub fn mailed_code(&self, email: &str) -> Option<String> {
        let message = self.outbox.last_to(email)?;
        extract_code(&message.body)
    }
}

pub fn email_of(id: &str) -> String {
    format!("{id}@students.example.edu")
}

pub fn extract_code(body: &str) -> Option<String> {
    body.split_whitespace()
        .map(|word| word.trim_end_matches('.'))
        .find(|word| word.len() == 6 && word.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Deterministic stand-in for one person's face descriptor
pub fn face(person: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(person);
    (0..DIMENSION).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Another capture of the same person with a little sensor noise
pub fn recapture(person: u64, capture: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(person.wrapping_mul(1_000_003).wrapping_add(capture));
    face(person)
        .into_iter()
        .map(|value| value + rng.gen_range(-0.02..0.02))
        .collect()
}

/// Three near-identical captures of `person`
pub fn captures(person: u64) -> Vec<Vec<f32>> {
    (1..=3).map(|capture| recapture(person, capture)).collect()
}

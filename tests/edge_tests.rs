//! Edge cases of the escalation, biometric and ballot layers
//!
//! - Concurrent ballot casts for one voter
//! - Login code retries, expiry and delivery failure
//! - Duplicate enrollment and cross-account verification
//! - Liveness enforcement
//! - Eligibility and role checks

mod common;

use campus_vote::{
    Error, Result,
    auth::{ENV_ADMIN_ID, FaceVoteOutcome, LoginOutcome, OtpStep},
    biometric::{CaptureSignals, FaceCapture, LivenessConfig, TimedSample},
    config::{AdminCredentials, Config},
    crypto::{BallotCast, FullSession, PasswordConfig, PasswordHasher},
    store::Datastore,
    types::{
        AccountStatus, ApprovalStatus, ClientContext, PrincipalId, Role, Selections,
        VerificationDecision, VerificationSource,
    },
};
use common::{Harness, PASSWORD, captures, email_of, face, recapture};
use std::time::Duration;
use uuid::Uuid;

fn selections() -> Selections {
    let mut selections = Selections::new();
    selections.insert("president".to_string(), vec!["p-01".to_string()]);
    selections
}

fn wrong_code(code: &str) -> String {
    let value: u32 = code.parse().expect("numeric code");
    format!("{:06}", (value + 1) % 1_000_000)
}

async fn pending_marker(harness: &Harness, id: &str) -> Result<String> {
    match harness.app.escalation.login(id, PASSWORD).await? {
        LoginOutcome::OtpRequired { pending, .. } => Ok(pending.token),
        other => panic!("expected a login code, got {other:?}"),
    }
}

// =============================================================================
// BALLOT UNIQUENESS
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_casts_commit_exactly_one_ballot() -> Result<()> {
    println!("🏁 Testing concurrent ballot casts for one voter...");

    let harness = Harness::new()?;
    let voter = harness.add_principal("2021-00417", Role::Voter)?;
    let election_id = Uuid::new_v4();

    let mut handles = Vec::new();
    for i in 0..16 {
        let app = harness.app.clone();
        let token = app.signer.issue(BallotCast {
            principal_id: voter.id.clone(),
            election_id,
        })?;

        handles.push(tokio::spawn(async move {
            let mut choice = Selections::new();
            choice.insert("president".to_string(), vec![format!("p-{i:02}")]);
            app.ballots.cast(&token.token, &choice).await
        }));
    }

    let mut committed = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => committed += 1,
            Err(Error::Conflict { .. }) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(committed, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(harness.store.ballot_count()?, 1);
    println!("✅ One ballot committed, {conflicts} rejected");
    Ok(())
}

#[tokio::test]
async fn test_one_ballot_per_election_not_per_voter() -> Result<()> {
    let harness = Harness::new()?;
    let voter = harness.add_principal("2021-00417", Role::Voter)?;

    for _ in 0..2 {
        let token = harness.app.signer.issue(BallotCast {
            principal_id: voter.id.clone(),
            election_id: Uuid::new_v4(),
        })?;
        harness.app.ballots.cast(&token.token, &selections()).await?;
    }

    assert_eq!(harness.store.ballot_count()?, 2);
    Ok(())
}

#[tokio::test]
async fn test_session_token_cannot_cast_a_ballot() -> Result<()> {
    let harness = Harness::new()?;
    let voter = harness.add_principal("2021-00417", Role::Voter)?;

    let session = harness.app.signer.issue(FullSession {
        principal_id: voter.id.clone(),
        role: Role::Voter,
        mfa: true,
    })?;

    let result = harness.app.ballots.cast(&session.token, &selections()).await;
    assert!(matches!(result, Err(Error::Unauthenticated { .. })));
    assert_eq!(harness.store.ballot_count()?, 0);
    Ok(())
}

#[tokio::test]
async fn test_invalid_selections_write_nothing() -> Result<()> {
    let harness = Harness::new()?;
    let voter = harness.add_principal("2021-00417", Role::Voter)?;
    let token = harness.app.signer.issue(BallotCast {
        principal_id: voter.id.clone(),
        election_id: Uuid::new_v4(),
    })?;

    let result = harness.app.ballots.cast(&token.token, &Selections::new()).await;
    assert!(matches!(result, Err(Error::InvalidInput { .. })));

    // The authorization is still usable after a rejected payload
    harness.app.ballots.cast(&token.token, &selections()).await?;
    assert_eq!(harness.store.ballot_count()?, 1);
    Ok(())
}

// =============================================================================
// LOGIN CODES
// =============================================================================

#[tokio::test]
async fn test_wrong_codes_allow_retry() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_principal("2021-00417", Role::Voter)?;

    let pending = pending_marker(&harness, "2021-00417").await?;
    let code = harness
        .mailed_code(&email_of("2021-00417"))
        .expect("login code mailed");

    for _ in 0..5 {
        let step = harness
            .app
            .escalation
            .verify_otp(&pending, &wrong_code(&code))
            .await?;
        assert!(matches!(step, OtpStep::Retry));
    }

    let step = harness.app.escalation.verify_otp(&pending, &code).await?;
    assert!(matches!(step, OtpStep::Verified { .. }));

    // A code works once
    let step = harness.app.escalation.verify_otp(&pending, &code).await?;
    assert!(matches!(step, OtpStep::Expired));
    Ok(())
}

#[tokio::test]
async fn test_new_login_replaces_the_code() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_principal("2021-00417", Role::Voter)?;

    let first_pending = pending_marker(&harness, "2021-00417").await?;
    let first = harness.mailed_code(&email_of("2021-00417")).expect("first code");

    let second_pending = pending_marker(&harness, "2021-00417").await?;
    let second = harness.mailed_code(&email_of("2021-00417")).expect("second code");

    if first != second {
        let step = harness
            .app
            .escalation
            .verify_otp(&first_pending, &first)
            .await?;
        assert!(matches!(step, OtpStep::Retry));
    }

    let step = harness
        .app
        .escalation
        .verify_otp(&second_pending, &second)
        .await?;
    assert!(matches!(step, OtpStep::Verified { .. }));
    Ok(())
}

#[tokio::test]
async fn test_expired_code_requires_new_login() -> Result<()> {
    let mut config = Config::for_testing()?;
    config.auth.otp_ttl_seconds = 0;
    let harness = Harness::with_config(config)?;
    harness.add_principal("2021-00417", Role::Voter)?;

    let pending = pending_marker(&harness, "2021-00417").await?;
    let code = harness
        .mailed_code(&email_of("2021-00417"))
        .expect("login code mailed");
    tokio::time::sleep(Duration::from_millis(20)).await;

    let step = harness.app.escalation.verify_otp(&pending, &code).await?;
    assert!(matches!(step, OtpStep::Expired));
    Ok(())
}

#[tokio::test]
async fn test_mail_failure_does_not_block_login() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_principal("2021-00417", Role::Voter)?;
    harness.outbox.set_failing(true);

    let outcome = harness.app.escalation.login("2021-00417", PASSWORD).await?;
    assert!(matches!(outcome, LoginOutcome::OtpRequired { .. }));
    assert!(harness.outbox.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_bad_credentials_look_the_same() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_principal("2021-00417", Role::Voter)?;

    let unknown = harness.app.escalation.login("2099-00000", PASSWORD).await;
    let wrong = harness.app.escalation.login("2021-00417", "not the password").await;

    match (unknown, wrong) {
        (Err(Error::Unauthenticated { reason: a }), Err(Error::Unauthenticated { reason: b })) => {
            assert_eq!(a, b)
        }
        other => panic!("expected two identical rejections, got {other:?}"),
    }
    assert!(harness.outbox.sent().is_empty());
    Ok(())
}

// =============================================================================
// ELIGIBILITY AND ROLES
// =============================================================================

#[tokio::test]
async fn test_ineligible_voters_are_forbidden() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_principal_with(
        "2021-00001",
        Role::Voter,
        ApprovalStatus::Pending,
        AccountStatus::Active,
    )?;
    harness.add_principal_with(
        "2021-00002",
        Role::Voter,
        ApprovalStatus::Declined,
        AccountStatus::Active,
    )?;
    harness.add_principal_with(
        "2021-00003",
        Role::Voter,
        ApprovalStatus::Approved,
        AccountStatus::Inactive,
    )?;
    harness.add_principal_with(
        "2021-00004",
        Role::Voter,
        ApprovalStatus::Approved,
        AccountStatus::Graduating,
    )?;

    for id in ["2021-00001", "2021-00002", "2021-00003", "2021-00004"] {
        let result = harness.app.escalation.login(id, PASSWORD).await;
        assert!(
            matches!(result, Err(Error::Forbidden { .. })),
            "{id} should be refused"
        );
    }
    assert!(harness.outbox.sent().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_environment_admin_login() -> Result<()> {
    let hasher = PasswordHasher::new(&PasswordConfig::for_testing())?;
    let mut config = Config::for_testing()?;
    config.auth.admin = Some(AdminCredentials {
        identifier: "elections@campus.example.edu".to_string(),
        password_hash: hasher.hash("s3cret-admin")?,
    });
    let harness = Harness::with_config(config)?;

    let outcome = harness
        .app
        .escalation
        .login("Elections@Campus.example.edu", "s3cret-admin")
        .await?;
    match outcome {
        LoginOutcome::Session {
            principal_id, role, ..
        } => {
            assert_eq!(principal_id, PrincipalId::new(ENV_ADMIN_ID));
            assert_eq!(role, Role::Admin);
        }
        other => panic!("expected a session, got {other:?}"),
    }

    let wrong = harness
        .app
        .escalation
        .login("elections@campus.example.edu", "guess")
        .await;
    assert!(matches!(wrong, Err(Error::Unauthenticated { .. })));
    Ok(())
}

#[tokio::test]
async fn test_admin_otp_required_routes_admin_through_code() -> Result<()> {
    let mut config = Config::for_testing()?;
    config.auth.admin_otp_required = true;
    let harness = Harness::with_config(config)?;
    harness.add_principal("registrar", Role::Admin)?;

    let pending = pending_marker(&harness, "registrar").await?;
    let code = harness.mailed_code(&email_of("registrar")).expect("code mailed");

    let selection = match harness.app.escalation.verify_otp(&pending, &code).await? {
        OtpStep::Verified { selection, .. } => selection,
        other => panic!("expected verified code, got {other:?}"),
    };

    // Administrators cannot take the voter branch
    let voter_branch = harness
        .app
        .escalation
        .escalate_to_voter_pre_auth(&selection.token)
        .await;
    assert!(matches!(voter_branch, Err(Error::Forbidden { .. })));

    let session = harness
        .app
        .escalation
        .escalate_to_admin_session(&selection.token)
        .await?;
    let verified = harness.app.escalation.authenticate_session(&session.token)?;
    assert_eq!(verified.claims.role, Role::Admin);
    Ok(())
}

#[tokio::test]
async fn test_admins_cannot_vote() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_principal("registrar", Role::Admin)?;

    let session = match harness.app.escalation.login("registrar", PASSWORD).await? {
        LoginOutcome::Session { session, .. } => session,
        other => panic!("expected a session, got {other:?}"),
    };

    let result = harness
        .app
        .escalation
        .verify_face_for_voting(
            &session.token,
            Uuid::new_v4(),
            FaceCapture::from_embeddings(vec![face(1)], None),
            &ClientContext::default(),
        )
        .await;
    assert!(matches!(result, Err(Error::Forbidden { .. })));
    Ok(())
}

// =============================================================================
// BIOMETRICS
// =============================================================================

#[tokio::test]
async fn test_duplicate_enrollment_rejected() -> Result<()> {
    println!("👥 Testing duplicate face enrollment...");

    let harness = Harness::new()?;
    harness.add_principal("2021-00001", Role::Voter)?;
    harness.add_principal("2021-00002", Role::Voter)?;

    harness.enrolled_session("2021-00001", 7).await?;
    assert_eq!(harness.store.template_count()?, 1);

    // Same person, fresh captures, second account
    let (pre_auth, _) = harness.pre_authorize("2021-00002").await?;
    let result = harness
        .app
        .escalation
        .enroll_face(
            &pre_auth,
            FaceCapture::from_embeddings(
                (20..23).map(|capture| recapture(7, capture)).collect(),
                None,
            ),
            &ClientContext::default(),
        )
        .await;

    match result {
        Err(Error::Conflict { message }) => {
            assert_eq!(message, "This face is already enrolled to another account")
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert_eq!(harness.store.template_count()?, 1);
    assert!(
        harness
            .store
            .get_template(&PrincipalId::new("2021-00002"))
            .await?
            .is_none()
    );

    let records = harness.store.audit_records().await?;
    let last = records.last().expect("audit record");
    assert_eq!(last.event.decision, VerificationDecision::DuplicateRejected);
    println!("✅ Duplicate rejected and audited");
    Ok(())
}

#[tokio::test]
async fn test_distinct_faces_both_enroll() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_principal("2021-00001", Role::Voter)?;
    harness.add_principal("2021-00002", Role::Voter)?;

    harness.enrolled_session("2021-00001", 7).await?;
    harness.enrolled_session("2021-00002", 8).await?;
    assert_eq!(harness.store.template_count()?, 2);
    Ok(())
}

#[tokio::test]
async fn test_reenrollment_requires_matching_face() -> Result<()> {
    let harness = Harness::new()?;
    let voter = harness.add_principal("2021-00001", Role::Voter)?;
    let client = ClientContext::default();

    let session = harness.enrolled_session("2021-00001", 7).await?;
    let original = harness.store.get_template(&voter.id).await?.expect("template");

    // A stranger holding the voter's pre-auth cannot swap in their own face
    let (pre_auth, has_face) = harness.pre_authorize("2021-00001").await?;
    assert!(has_face);
    let result = harness
        .app
        .escalation
        .enroll_face(&pre_auth, FaceCapture::from_embeddings(captures(99), None), &client)
        .await;
    assert!(matches!(result, Err(Error::Forbidden { .. })));

    let template = harness.store.get_template(&voter.id).await?.expect("template");
    assert_eq!(template, original);

    let outcome = harness
        .app
        .escalation
        .verify_face_for_voting(
            &session,
            Uuid::new_v4(),
            FaceCapture::from_embeddings(vec![recapture(99, 1)], None),
            &client,
        )
        .await?;
    assert!(matches!(outcome, FaceVoteOutcome::NoMatch { .. }));

    let records = harness.store.audit_records().await?;
    assert!(records.iter().any(|record| {
        record.event.decision == VerificationDecision::NoMatch
            && record.event.source == VerificationSource::Enrollment
    }));

    // The enrolled voter can still refresh their own template
    let (pre_auth, _) = harness.pre_authorize("2021-00001").await?;
    let grant = harness
        .app
        .escalation
        .enroll_face(
            &pre_auth,
            FaceCapture::from_embeddings(vec![recapture(7, 30), recapture(7, 31)], None),
            &client,
        )
        .await?;
    assert_eq!(grant.outcome.samples_stored, 2);

    let template = harness.store.get_template(&voter.id).await?.expect("template");
    assert_eq!(template.sample_count(), 2);
    assert_eq!(harness.store.template_count()?, 1);
    Ok(())
}

#[tokio::test]
async fn test_face_of_another_account_is_a_conflict() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_principal("2021-00001", Role::Voter)?;
    harness.add_principal("2021-00002", Role::Voter)?;

    harness.enrolled_session("2021-00001", 7).await?;
    let session = harness.enrolled_session("2021-00002", 9).await?;

    // Voter two presents voter one's face at the ballot
    let result = harness
        .app
        .escalation
        .verify_face_for_voting(
            &session,
            Uuid::new_v4(),
            FaceCapture::from_embeddings(vec![recapture(7, 40)], None),
            &ClientContext {
                client_ip: Some("10.0.4.17".to_string()),
                user_agent: Some("kiosk-3".to_string()),
            },
        )
        .await;
    assert!(matches!(result, Err(Error::Conflict { .. })));

    let records = harness.store.audit_records().await?;
    let last = records.last().expect("audit record");
    assert_eq!(last.event.decision, VerificationDecision::CrossAccountMatch);
    assert_eq!(last.event.client_ip.as_deref(), Some("10.0.4.17"));
    assert!(last.event.election_id.is_some());
    Ok(())
}

#[tokio::test]
async fn test_unrelated_face_does_not_authorize_a_ballot() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_principal("2021-00001", Role::Voter)?;
    let session = harness.enrolled_session("2021-00001", 7).await?;

    let outcome = harness
        .app
        .escalation
        .verify_face_for_voting(
            &session,
            Uuid::new_v4(),
            FaceCapture::from_embeddings(vec![face(1234)], None),
            &ClientContext::default(),
        )
        .await?;

    match outcome {
        FaceVoteOutcome::NoMatch { report } => {
            assert!(!report.matched);
            assert!(report.best < report.threshold);
        }
        FaceVoteOutcome::Authorized { .. } => panic!("an unrelated face must not match"),
    }

    let records = harness.store.audit_records().await?;
    assert_eq!(
        records.last().expect("audit record").event.decision,
        VerificationDecision::NoMatch
    );
    Ok(())
}

#[tokio::test]
async fn test_wrong_descriptor_length_is_invalid_input() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_principal("2021-00001", Role::Voter)?;
    let (pre_auth, _) = harness.pre_authorize("2021-00001").await?;

    let result = harness
        .app
        .escalation
        .enroll_face(
            &pre_auth,
            FaceCapture::from_embeddings(vec![vec![0.1; 64]], None),
            &ClientContext::default(),
        )
        .await;
    assert!(matches!(result, Err(Error::InvalidInput { .. })));
    assert_eq!(harness.store.template_count()?, 0);
    Ok(())
}

#[tokio::test]
async fn test_enforced_liveness_gates_enrollment() -> Result<()> {
    let mut config = Config::for_testing()?;
    config.liveness = LivenessConfig::default();
    let harness = Harness::with_config(config)?;
    harness.add_principal("2021-00001", Role::Voter)?;
    let (pre_auth, _) = harness.pre_authorize("2021-00001").await?;

    let without_signals = harness
        .app
        .escalation
        .enroll_face(
            &pre_auth,
            FaceCapture::from_embeddings(captures(7), None),
            &ClientContext::default(),
        )
        .await;
    assert!(matches!(without_signals, Err(Error::Forbidden { .. })));

    let blink = CaptureSignals {
        eye_aspect_ratios: [(0, 0.31), (120, 0.12), (260, 0.30)]
            .into_iter()
            .map(|(at_ms, value)| TimedSample { at_ms, value })
            .collect(),
        yaw_degrees: Vec::new(),
        brightness: 0.55,
    };
    let grant = harness
        .app
        .escalation
        .enroll_face(
            &pre_auth,
            FaceCapture::from_embeddings(captures(7), Some(blink)),
            &ClientContext::default(),
        )
        .await?;
    assert_eq!(grant.outcome.samples_stored, 3);
    Ok(())
}

#[tokio::test]
async fn test_audit_outage_does_not_fail_verification() -> Result<()> {
    let harness = Harness::new()?;
    harness.add_principal("2021-00001", Role::Voter)?;
    let session = harness.enrolled_session("2021-00001", 7).await?;

    harness.store.set_audit_unavailable(true);
    let outcome = harness
        .app
        .escalation
        .verify_face_for_voting(
            &session,
            Uuid::new_v4(),
            FaceCapture::from_embeddings(vec![recapture(7, 50)], None),
            &ClientContext::default(),
        )
        .await?;
    assert!(matches!(outcome, FaceVoteOutcome::Authorized { .. }));

    assert!(
        harness
            .store
            .get_template(&PrincipalId::new("2021-00001"))
            .await?
            .is_some()
    );
    Ok(())
}

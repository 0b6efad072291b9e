//! Credential escalation state machine
//!
//! Each transition consumes the token of the previous stage and mints the
//! token of the next one:
//!
//! ```text
//! login ──► PendingCredential ──verify_otp──► SelectionVerified
//!   │                                            │         │
//!   │ (admin)                     admin_session  │         │ voter_pre_auth
//!   ▼                                            ▼         ▼
//! FullSession ◄────────────────────────────── FullSession  VoterPreAuth
//!   │                                                      │
//!   │ verify_face_for_voting            enroll_face /      │
//!   ▼                                   verify_face_for_login
//! BallotCast                                 ──► FullSession
//! ```
//!
//! The stored role and account status are re-read at every step; a token is
//! never trusted for more than the stage it proves.

use crate::auth::otp::{OtpService, OtpVerification};
use crate::biometric::{
    BiometricService, EnrollmentOutcome, FaceCapture, MatchReport, VerificationPurpose,
};
use crate::config::{AdminCredentials, AuthConfig};
use crate::crypto::{
    BallotCast, FullSession, IssuedToken, PasswordHasher, PendingCredential, SelectionTarget,
    SelectionVerified, TokenSigner, VerifiedToken, VoterPreAuth,
};
use crate::notify::{MailMessage, Notifier};
use crate::store::Datastore;
use crate::types::{ClientContext, ElectionId, Principal, PrincipalId, Role};
use crate::{Error, Result};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Principal id of the environment-configured administrator
pub const ENV_ADMIN_ID: &str = "env-admin";

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Result of a password login
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Administrator login; no further step required
    Session {
        principal_id: PrincipalId,
        role: Role,
        session: IssuedToken,
    },
    /// A login code was sent; present it with the pending marker
    OtpRequired {
        principal_id: PrincipalId,
        role: Role,
        pending: IssuedToken,
        has_face: bool,
    },
}

/// Result of presenting a login code
#[derive(Debug, Clone)]
pub enum OtpStep {
    Verified {
        selection: IssuedToken,
        target: SelectionTarget,
    },
    Retry,
    Expired,
}

#[derive(Debug, Clone)]
pub struct PreAuthGrant {
    pub pre_auth: IssuedToken,
    pub has_face: bool,
}

#[derive(Debug, Clone)]
pub struct EnrollmentGrant {
    pub session: IssuedToken,
    pub outcome: EnrollmentOutcome,
}

#[derive(Debug, Clone)]
pub enum FaceLoginOutcome {
    Matched {
        session: IssuedToken,
        report: MatchReport,
    },
    NoMatch {
        report: MatchReport,
    },
}

#[derive(Debug, Clone)]
pub enum FaceVoteOutcome {
    Authorized {
        ballot: IssuedToken,
        report: MatchReport,
    },
    NoMatch {
        report: MatchReport,
    },
}

pub struct EscalationService {
    store: Arc<dyn Datastore>,
    signer: Arc<TokenSigner>,
    passwords: Arc<PasswordHasher>,
    otp: OtpService,
    notifier: Arc<dyn Notifier>,
    biometrics: Arc<BiometricService>,
    config: AuthConfig,
}

impl EscalationService {
    pub fn new(
        store: Arc<dyn Datastore>,
        signer: Arc<TokenSigner>,
        passwords: Arc<PasswordHasher>,
        otp: OtpService,
        notifier: Arc<dyn Notifier>,
        biometrics: Arc<BiometricService>,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            signer,
            passwords,
            otp,
            notifier,
            biometrics,
            config,
        }
    }

    pub fn signer(&self) -> &Arc<TokenSigner> {
        &self.signer
    }

    /// Check a password and start the escalation
    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginOutcome> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(Error::invalid_input("Identifier and password are required"));
        }

        if let Some(admin) = &self.config.admin {
            if admin.identifier.eq_ignore_ascii_case(identifier) {
                return self.login_env_admin(admin, password).await;
            }
        }

        let Some(principal) = self.store.find_principal_by_identifier(identifier).await? else {
            self.check_password(password, None).await?;
            tracing::info!("Login rejected: unknown identifier");
            return Err(Error::unauthenticated(INVALID_CREDENTIALS));
        };

        if !self.check_password(password, Some(&principal.credential_hash)).await? {
            tracing::info!(principal = %principal.id, "Login rejected: wrong password");
            return Err(Error::unauthenticated(INVALID_CREDENTIALS));
        }

        match principal.role {
            Role::Admin if !self.config.admin_otp_required => {
                let session = self.issue_session(&principal.id, Role::Admin)?;
                tracing::info!(principal = %principal.id, "🔐 Administrator signed in");
                return Ok(LoginOutcome::Session {
                    principal_id: principal.id,
                    role: Role::Admin,
                    session,
                });
            }
            Role::Admin => {}
            Role::Voter => principal.ensure_eligible_voter()?,
        }

        self.send_login_code(&principal).await?;

        let has_face = match principal.role {
            Role::Voter => self.store.get_template(&principal.id).await?.is_some(),
            Role::Admin => false,
        };
        let pending = self.signer.issue(PendingCredential {
            principal_id: principal.id.clone(),
        })?;

        tracing::info!(principal = %principal.id, has_face, "Password accepted, login code sent");

        Ok(LoginOutcome::OtpRequired {
            principal_id: principal.id,
            role: principal.role,
            pending,
            has_face,
        })
    }

    async fn login_env_admin(
        &self,
        admin: &AdminCredentials,
        password: &str,
    ) -> Result<LoginOutcome> {
        if !self.check_password(password, Some(&admin.password_hash)).await? {
            tracing::warn!("Administrator login rejected: wrong password");
            return Err(Error::unauthenticated(INVALID_CREDENTIALS));
        }

        let principal_id = PrincipalId::new(ENV_ADMIN_ID);
        let session = self.issue_session(&principal_id, Role::Admin)?;
        tracing::info!("🔐 Environment administrator signed in");

        Ok(LoginOutcome::Session {
            principal_id,
            role: Role::Admin,
            session,
        })
    }

    /// Argon2 check on the blocking pool; `None` burns a dummy verification
    async fn check_password(&self, password: &str, phc: Option<&str>) -> Result<bool> {
        let passwords = self.passwords.clone();
        let password = Zeroizing::new(password.to_string());
        let phc = phc.map(str::to_string);

        tokio::task::spawn_blocking(move || match phc {
            Some(phc) => passwords.verify(&password, &phc),
            None => Ok(passwords.verify_dummy(&password)),
        })
        .await
        .map_err(|e| Error::internal(format!("Password check task failed: {e}")))?
    }

    async fn send_login_code(&self, principal: &Principal) -> Result<()> {
        let code = self.otp.issue(&principal.id).await?;
        let message = MailMessage::login_code(&principal.email, &code, self.otp.ttl_seconds());

        // Delivery failure must not block login; the code goes to the log instead
        if let Err(e) = self.notifier.send(&message).await {
            tracing::warn!(
                principal = %principal.id,
                error = %e,
                fallback_code = %code,
                "Login code delivery failed"
            );
        }
        Ok(())
    }

    /// Present the login code bound to a pending marker
    pub async fn verify_otp(&self, pending_token: &str, code: &str) -> Result<OtpStep> {
        let pending = self.signer.verify::<PendingCredential>(pending_token)?;
        let principal = self.load_principal(&pending.claims.principal_id).await?;

        match self.otp.verify(&principal.id, code).await? {
            OtpVerification::Verified => {
                let target = match principal.role {
                    Role::Admin => SelectionTarget::AdminSession,
                    Role::Voter => SelectionTarget::VoterPreAuth,
                };
                let selection = self.signer.issue(SelectionVerified {
                    principal_id: principal.id.clone(),
                    otp_verified: true,
                    target,
                })?;
                tracing::info!(principal = %principal.id, target = ?target, "Login code verified");
                Ok(OtpStep::Verified { selection, target })
            }
            OtpVerification::Retry => Ok(OtpStep::Retry),
            OtpVerification::Expired => Ok(OtpStep::Expired),
        }
    }

    /// Spend a verified selection on an administrator session
    pub async fn escalate_to_admin_session(&self, selection_token: &str) -> Result<IssuedToken> {
        let selection = self.verify_selection(selection_token)?;
        let principal = self.load_principal(&selection.principal_id).await?;

        if principal.role != Role::Admin || selection.target != SelectionTarget::AdminSession {
            tracing::warn!(principal = %principal.id, "Administrator escalation refused");
            return Err(Error::forbidden("Administrator access required"));
        }

        let session = self.issue_session(&principal.id, Role::Admin)?;
        tracing::info!(principal = %principal.id, "🔐 Administrator session granted");
        Ok(session)
    }

    /// Spend a verified selection on a voter pre-authorization
    pub async fn escalate_to_voter_pre_auth(&self, selection_token: &str) -> Result<PreAuthGrant> {
        let selection = self.verify_selection(selection_token)?;
        let principal = self.load_principal(&selection.principal_id).await?;

        if principal.role != Role::Voter || selection.target != SelectionTarget::VoterPreAuth {
            tracing::warn!(principal = %principal.id, "Voter escalation refused");
            return Err(Error::forbidden("Voter access required"));
        }
        principal.ensure_eligible_voter()?;

        let pre_auth = self.signer.issue(VoterPreAuth {
            principal_id: principal.id.clone(),
            role: Role::Voter,
            pre_auth: true,
        })?;
        let has_face = self.store.get_template(&principal.id).await?.is_some();

        Ok(PreAuthGrant { pre_auth, has_face })
    }

    /// Enroll the voter's face and open a session
    ///
    /// A voter who already has a template must present a capture that matches
    /// it before the template is replaced.
    pub async fn enroll_face(
        &self,
        pre_auth_token: &str,
        capture: FaceCapture,
        client: &ClientContext,
    ) -> Result<EnrollmentGrant> {
        let principal = self.pre_authorized_voter(pre_auth_token).await?;
        let probe = self.biometrics.admit_capture(capture)?;

        if self.store.get_template(&principal.id).await?.is_some() {
            let report = self
                .biometrics
                .verify(&principal.id, &probe, VerificationPurpose::Reenrollment, client)
                .await?;
            if !report.matched {
                tracing::warn!(
                    principal = %principal.id,
                    best = report.best,
                    "🚫 Re-enrollment refused: capture does not match the enrolled face"
                );
                return Err(Error::forbidden(
                    "A face is already enrolled for this account; re-enrollment requires a matching capture",
                ));
            }
        }

        let outcome = self.biometrics.enroll(&principal.id, &probe, client).await?;
        let session = self.issue_session(&principal.id, Role::Voter)?;

        Ok(EnrollmentGrant { session, outcome })
    }

    /// Verify the voter's face and open a session on a match
    pub async fn verify_face_for_login(
        &self,
        pre_auth_token: &str,
        capture: FaceCapture,
        client: &ClientContext,
    ) -> Result<FaceLoginOutcome> {
        let principal = self.pre_authorized_voter(pre_auth_token).await?;
        let probe = self.biometrics.admit_capture(capture)?;

        let report = self
            .biometrics
            .verify(&principal.id, &probe, VerificationPurpose::Login, client)
            .await?;

        if !report.matched {
            return Ok(FaceLoginOutcome::NoMatch { report });
        }

        let session = self.issue_session(&principal.id, Role::Voter)?;
        Ok(FaceLoginOutcome::Matched { session, report })
    }

    /// Re-verify the voter's face and authorize one ballot in `election_id`
    pub async fn verify_face_for_voting(
        &self,
        session_token: &str,
        election_id: ElectionId,
        capture: FaceCapture,
        client: &ClientContext,
    ) -> Result<FaceVoteOutcome> {
        let session = self.authenticate_session(session_token)?;
        if session.claims.role != Role::Voter {
            return Err(Error::forbidden("Only voters can cast ballots"));
        }

        let principal = self.load_principal(&session.claims.principal_id).await?;
        if principal.role != Role::Voter {
            return Err(Error::forbidden("Only voters can cast ballots"));
        }
        principal.ensure_eligible_voter()?;

        if self.store.has_ballot(&principal.id, &election_id).await? {
            return Err(Error::conflict("You have already voted in this election"));
        }

        let probe = self.biometrics.admit_capture(capture)?;
        let report = self
            .biometrics
            .verify(
                &principal.id,
                &probe,
                VerificationPurpose::Voting { election_id },
                client,
            )
            .await?;

        if !report.matched {
            return Ok(FaceVoteOutcome::NoMatch { report });
        }

        let ballot = self.signer.issue(BallotCast {
            principal_id: principal.id.clone(),
            election_id,
        })?;
        tracing::info!(principal = %principal.id, election = %election_id, "🗳️ Ballot authorized");

        Ok(FaceVoteOutcome::Authorized { ballot, report })
    }

    /// Verify a session token
    pub fn authenticate_session(&self, session_token: &str) -> Result<VerifiedToken<FullSession>> {
        let session = self.signer.verify::<FullSession>(session_token)?;
        if !session.claims.mfa {
            return Err(Error::unauthenticated("Session was not fully authenticated"));
        }
        Ok(session)
    }

    /// Record a logout; tokens are stateless so the caller clears every cookie
    pub fn logout(&self, session_token: Option<&str>) {
        match session_token.map(|token| self.signer.verify::<FullSession>(token)) {
            Some(Ok(session)) => {
                tracing::info!(principal = %session.claims.principal_id, "Signed out")
            }
            _ => tracing::debug!("Signed out without a valid session"),
        }
    }

    fn issue_session(&self, principal_id: &PrincipalId, role: Role) -> Result<IssuedToken> {
        self.signer.issue(FullSession {
            principal_id: principal_id.clone(),
            role,
            mfa: true,
        })
    }

    fn verify_selection(&self, selection_token: &str) -> Result<SelectionVerified> {
        let selection = self.signer.verify::<SelectionVerified>(selection_token)?;
        if !selection.claims.otp_verified {
            return Err(Error::unauthenticated("Login code was not verified"));
        }
        Ok(selection.claims)
    }

    async fn pre_authorized_voter(&self, pre_auth_token: &str) -> Result<Principal> {
        let pre_auth = self.signer.verify::<VoterPreAuth>(pre_auth_token)?;
        if !pre_auth.claims.pre_auth || pre_auth.claims.role != Role::Voter {
            return Err(Error::forbidden("Voter pre-authorization required"));
        }

        let principal = self.load_principal(&pre_auth.claims.principal_id).await?;
        if principal.role != Role::Voter {
            return Err(Error::forbidden("Voter pre-authorization required"));
        }
        principal.ensure_eligible_voter()?;
        Ok(principal)
    }

    async fn load_principal(&self, id: &PrincipalId) -> Result<Principal> {
        self.store
            .get_principal(id)
            .await?
            .ok_or_else(|| Error::unauthenticated("Account no longer exists"))
    }
}

//! Service wiring
//!
//! Builds every service from one [`Config`] over a shared datastore and
//! notifier. The HTTP layer and tests both start from here.

use crate::auth::{EscalationService, OtpService};
use crate::ballot::BallotGuard;
use crate::biometric::{BiometricService, LivenessGate, TemplateMatcher};
use crate::config::Config;
use crate::crypto::{
    BallotCipher, KeyRing, PasswordHasher, SecureSaltManager, TokenSigner, VerificationAuditor,
};
use crate::notify::{MemoryNotifier, Notifier, notifier_from_config};
use crate::store::{Datastore, MemoryStore};
use crate::Result;
use std::sync::Arc;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn Datastore>,
    pub signer: Arc<TokenSigner>,
    pub passwords: Arc<PasswordHasher>,
    pub biometrics: Arc<BiometricService>,
    pub escalation: EscalationService,
    pub ballots: BallotGuard,
}

impl AppContext {
    pub fn new(
        config: Config,
        store: Arc<dyn Datastore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.matcher.validate()?;

        let keys = Arc::new(KeyRing::from_seed(
            &config.security.token_signing_seed_bytes()?,
            config.security.max_previous_signing_keys,
        ));
        let key_stats = keys.stats()?;
        tracing::info!(
            key_id = %key_stats.current_key_id,
            previous_keys = key_stats.previous_keys_count,
            "🔑 Token signing key loaded"
        );
        let signer = Arc::new(TokenSigner::new(keys, config.auth.tokens.clone()));
        let passwords = Arc::new(PasswordHasher::new(&config.passwords)?);

        let auditor = Arc::new(VerificationAuditor::new(store.clone()));
        let biometrics = Arc::new(BiometricService::new(
            store.clone(),
            TemplateMatcher::new(config.matcher.clone()),
            LivenessGate::new(config.liveness.clone()),
            auditor,
        ));

        let otp = OtpService::new(
            store.clone(),
            SecureSaltManager::from_config(&config.security)?,
            config.auth.otp_ttl_seconds,
        );
        let escalation = EscalationService::new(
            store.clone(),
            signer.clone(),
            passwords.clone(),
            otp,
            notifier,
            biometrics.clone(),
            config.auth.clone(),
        );

        let ballots = BallotGuard::new(
            store.clone(),
            signer.clone(),
            BallotCipher::new(&config.security.ballot_key_bytes()?)?,
        );

        tracing::info!(
            dimension = config.matcher.dimension,
            liveness_enforced = config.liveness.enforced,
            admin_configured = config.auth.admin.is_some(),
            "Election core services ready"
        );

        Ok(Self {
            config,
            store,
            signer,
            passwords,
            biometrics,
            escalation,
            ballots,
        })
    }

    /// Services from the environment over an in-memory store
    pub fn from_env() -> Result<Self> {
        let config = Config::from_env()?;
        let notifier = notifier_from_config(&config.mail)?;
        Self::new(config, Arc::new(MemoryStore::new()), notifier)
    }

    /// Test services sharing the given store and outbox
    pub fn for_testing(store: Arc<MemoryStore>, outbox: Arc<MemoryNotifier>) -> Result<Self> {
        Self::new(Config::for_testing()?, store, outbox)
    }
}

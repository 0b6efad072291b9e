//! Secure configuration management for the election core
//!
//! Loads sensitive configuration from environment variables with validation.

use crate::biometric::{LivenessConfig, MatcherConfig};
use crate::crypto::{PasswordConfig, TokenLifetimes};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Minimum decoded length of every secret
const MIN_SECRET_BYTES: usize = 32;

/// Security configuration for cryptographic operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Seed of the initial Ed25519 token signing key (base64, 32 bytes)
    pub token_signing_seed: String,

    /// AES-256-GCM key for ballot payloads (base64, 32 bytes)
    pub ballot_encryption_key: String,

    /// Key for one-time code digests (base64, minimum 32 bytes)
    pub otp_salt: String,

    /// Retired signing keys kept for verification after a rotation
    pub max_previous_signing_keys: usize,
}

impl SecurityConfig {
    /// Load security configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let token_signing_seed = required_env("TOKEN_SIGNING_SEED")?;
        let ballot_encryption_key = required_env("BALLOT_ENCRYPTION_KEY")?;
        let otp_salt = required_env("OTP_SALT")?;

        Self::validate_secret(&token_signing_seed, "TOKEN_SIGNING_SEED")?;
        Self::validate_secret(&ballot_encryption_key, "BALLOT_ENCRYPTION_KEY")?;
        Self::validate_secret(&otp_salt, "OTP_SALT")?;

        Ok(Self {
            token_signing_seed,
            ballot_encryption_key,
            otp_salt,
            max_previous_signing_keys: env_or("TOKEN_MAX_PREVIOUS_KEYS", 3)?,
        })
    }

    /// Create configuration for testing
    pub fn for_testing() -> Result<Self> {
        use base64::Engine;
        let engine = base64::engine::general_purpose::STANDARD;

        Ok(Self {
            token_signing_seed: engine.encode(rand::random::<[u8; 32]>()),
            ballot_encryption_key: engine.encode(rand::random::<[u8; 32]>()),
            otp_salt: engine.encode(rand::random::<[u8; 32]>()),
            max_previous_signing_keys: 2,
        })
    }

    /// Validate a base64-encoded secret
    fn validate_secret(secret: &str, name: &str) -> Result<()> {
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(secret)
            .map_err(|_| Error::internal(format!("{name} must be valid base64")))?;

        if decoded.len() < MIN_SECRET_BYTES {
            return Err(Error::internal(format!(
                "{name} must be at least {MIN_SECRET_BYTES} bytes when decoded"
            )));
        }

        Ok(())
    }

    /// Signing seed as a fixed 32-byte array
    pub fn token_signing_seed_bytes(&self) -> Result<[u8; 32]> {
        decode_key(&self.token_signing_seed, "token signing seed")
    }

    /// Ballot key as a fixed 32-byte array
    pub fn ballot_key_bytes(&self) -> Result<[u8; 32]> {
        decode_key(&self.ballot_encryption_key, "ballot encryption key")
    }

    /// OTP digest key (first 32 bytes of the salt)
    pub fn otp_salt_bytes(&self) -> Result<[u8; 32]> {
        decode_key(&self.otp_salt, "OTP salt")
    }
}

/// Environment-configured administrator login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCredentials {
    pub identifier: String,
    /// Argon2id PHC string
    pub password_hash: String,
}

/// Escalation protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub admin: Option<AdminCredentials>,

    /// Route datastore admins through the OTP step as well
    pub admin_otp_required: bool,

    /// Lifetime of a login code in seconds (default: 5 minutes)
    pub otp_ttl_seconds: u64,

    pub tokens: TokenLifetimes,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        let admin = match (
            std::env::var("ADMIN_IDENTIFIER").ok(),
            std::env::var("ADMIN_PASSWORD_HASH").ok(),
        ) {
            (Some(identifier), Some(password_hash)) => Some(AdminCredentials {
                identifier,
                password_hash,
            }),
            (None, None) => None,
            _ => {
                return Err(Error::internal(
                    "ADMIN_IDENTIFIER and ADMIN_PASSWORD_HASH must be set together",
                ));
            }
        };

        let defaults = TokenLifetimes::default();
        let tokens = TokenLifetimes {
            pending_credential: env_or("TOKEN_PENDING_SECONDS", defaults.pending_credential)?,
            selection_verified: env_or("TOKEN_SELECTION_SECONDS", defaults.selection_verified)?,
            voter_pre_auth: env_or("TOKEN_PRE_AUTH_SECONDS", defaults.voter_pre_auth)?,
            full_session: env_or("TOKEN_SESSION_SECONDS", defaults.full_session)?,
            ballot_cast: env_or("TOKEN_BALLOT_SECONDS", defaults.ballot_cast)?,
        };

        Ok(Self {
            admin,
            admin_otp_required: env_or("ADMIN_OTP_REQUIRED", false)?,
            otp_ttl_seconds: env_or("OTP_TTL_SECONDS", 300)?,
            tokens,
        })
    }

    pub fn for_testing() -> Self {
        Self {
            admin: None,
            admin_otp_required: false,
            otp_ttl_seconds: 300,
            tokens: TokenLifetimes::default(),
        }
    }
}

/// Outbound mail settings; without an API URL the diagnostic notifier is used
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from_address: String,
    pub timeout_seconds: u64,
}

impl MailConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_url: std::env::var("MAIL_API_URL").ok().filter(|v| !v.is_empty()),
            api_key: std::env::var("MAIL_API_KEY").ok().filter(|v| !v.is_empty()),
            from_address: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@campus-vote.local".to_string()),
            timeout_seconds: env_or("MAIL_TIMEOUT_SECONDS", 10)?,
        })
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub security: SecurityConfig,
    pub auth: AuthConfig,
    pub matcher: MatcherConfig,
    pub liveness: LivenessConfig,
    pub passwords: PasswordConfig,
    pub mail: MailConfig,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration from environment
    pub fn from_env() -> Result<Self> {
        let security = SecurityConfig::from_env()?;
        let auth = AuthConfig::from_env()?;

        let defaults = MatcherConfig::default();
        let matcher = MatcherConfig {
            dimension: env_or("FACE_DESCRIPTOR_DIMENSION", defaults.dimension)?,
            match_threshold: env_or("FACE_MATCH_THRESHOLD", defaults.match_threshold)?,
            duplicate_threshold: env_or("FACE_DUPLICATE_THRESHOLD", defaults.duplicate_threshold)?,
            corroboration_floor: env_or("FACE_CORROBORATION_FLOOR", defaults.corroboration_floor)?,
            strict_ceiling: env_or("FACE_STRICT_CEILING", defaults.strict_ceiling)?,
            suspicion_floor: env_or("FACE_SUSPICION_FLOOR", defaults.suspicion_floor)?,
            ..defaults
        };
        matcher.validate()?;

        let liveness = LivenessConfig {
            enforced: env_or("LIVENESS_ENFORCED", true)?,
            ..LivenessConfig::default()
        };

        let logging = LoggingConfig {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
        };

        Ok(Self {
            security,
            auth,
            matcher,
            liveness,
            passwords: PasswordConfig::default(),
            mail: MailConfig::from_env()?,
            logging,
        })
    }

    /// Create configuration for testing
    pub fn for_testing() -> Result<Self> {
        let security = SecurityConfig::for_testing()?;

        let logging = LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        };

        Ok(Self {
            security,
            auth: AuthConfig::for_testing(),
            matcher: MatcherConfig::default(),
            liveness: LivenessConfig::disabled(),
            passwords: PasswordConfig::for_testing(),
            mail: MailConfig::default(),
            logging,
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::internal(format!("{name} environment variable required")))
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::internal(format!("Invalid {name}"))),
        Err(_) => Ok(default),
    }
}

fn decode_key(encoded: &str, what: &str) -> Result<[u8; 32]> {
    use base64::Engine;
    let decoded = zeroize::Zeroizing::new(
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| Error::internal(format!("Invalid {what}")))?,
    );

    if decoded.len() < MIN_SECRET_BYTES {
        return Err(Error::internal(format!("{what} is too short")));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&decoded[..32]);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_config_validation() {
        let config = SecurityConfig::for_testing().unwrap();

        assert!(config.token_signing_seed_bytes().is_ok());
        assert!(config.ballot_key_bytes().is_ok());
        assert!(config.otp_salt_bytes().is_ok());
        assert_ne!(
            config.token_signing_seed_bytes().unwrap(),
            config.ballot_key_bytes().unwrap()
        );
    }

    #[test]
    fn test_secret_validation() {
        use base64::Engine;
        let valid = base64::engine::general_purpose::STANDARD.encode([0u8; 32]);
        assert!(SecurityConfig::validate_secret(&valid, "TEST").is_ok());

        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert!(SecurityConfig::validate_secret(&short, "TEST").is_err());

        assert!(SecurityConfig::validate_secret("invalid_base64!", "TEST").is_err());
    }

    #[test]
    fn test_testing_config_is_consistent() {
        let config = Config::for_testing().unwrap();
        assert!(config.matcher.validate().is_ok());
        assert!(!config.liveness.enforced);
        assert_eq!(config.auth.otp_ttl_seconds, 300);
        assert!(config.mail.api_url.is_none());
    }
}

//! Campus election core
//!
//! Credential escalation from password to ballot, face-template matching with
//! liveness and duplicate checks, and an encrypted one-ballot-per-voter guard.

pub mod app;
pub mod auth;
pub mod ballot;
pub mod biometric;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod http;
pub mod notify;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use app::AppContext;
pub use errors::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging with the default filter
pub fn init() -> Result<()> {
    init_with(&config::LoggingConfig {
        level: "info".to_string(),
        format: "pretty".to_string(),
    })
}

/// Initialize logging from configuration; `RUST_LOG` overrides the level
pub fn init_with(logging: &config::LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("campus_vote={}", logging.level).into()
    });

    let installed = match logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    installed.map_err(|e| Error::internal(format!("Logging already initialized: {e}")))?;

    tracing::info!("🗳️  Campus vote core v{} initialized", VERSION);
    Ok(())
}

//! Error handling for the election core

/// Result type alias for the election core
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the election core
///
/// The first five variants form the caller-facing taxonomy; the HTTP layer maps
/// each of them to a status code. The remaining variants are internal failures.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Missing, invalid, expired or wrong-purpose token; bad credentials
    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    /// Role mismatch, or account not approved/active
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    /// Duplicate biometric enrollment or duplicate ballot
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Malformed embedding, missing fields, malformed code
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Datastore or mail sink failure
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    /// Cryptographic operation errors
    #[error("Cryptographic error: {message}")]
    Crypto { message: String },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a new crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error belongs to the caller-facing taxonomy
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated { .. }
                | Self::Forbidden { .. }
                | Self::Conflict { .. }
                | Self::InvalidInput { .. }
                | Self::Unavailable { .. }
        )
    }
}

/// Convenience macros for creating specific error types
#[macro_export]
macro_rules! crypto_error {
    ($msg:expr) => {
        $crate::Error::crypto($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::crypto(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! auth_error {
    ($msg:expr) => {
        $crate::Error::unauthenticated($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::unauthenticated(format!($fmt, $($arg)*))
    };
}

//! HTTP mapping of core errors

use crate::Error;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl Error {
    /// HTTP status for this error
    ///
    /// - Unauthenticated: 401
    /// - Forbidden: 403
    /// - Conflict: 409
    /// - InvalidInput: 400
    /// - Unavailable: 503
    /// - anything else: 500
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Crypto { .. } | Self::Serialization(_) | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::Forbidden { .. } => "forbidden",
            Self::Conflict { .. } => "conflict",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Unavailable { .. } => "unavailable",
            Self::Crypto { .. } | Self::Serialization(_) | Self::Internal { .. } => "internal",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Unauthenticated { reason } | Self::Forbidden { reason } => reason.clone(),
            Self::Conflict { message } | Self::InvalidInput { message } => message.clone(),
            Self::Unavailable { service, .. } => format!("{service} is temporarily unavailable"),
            Self::Crypto { .. } | Self::Serialization(_) | Self::Internal { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if !self.is_client_facing() {
            tracing::error!(error = %self, "Request failed");
        } else if status.is_server_error() {
            tracing::warn!(error = %self, "Dependency unavailable");
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

//! JSON HTTP surface

pub mod cookies;
pub mod error;
pub mod extract;
pub mod handlers;

use crate::app::AppContext;
use axum::Router;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;

pub fn router(app: Arc<AppContext>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/otp", post(handlers::verify_otp))
        .route("/api/auth/admin-session", post(handlers::admin_session))
        .route("/api/auth/voter-pre-auth", post(handlers::voter_pre_auth))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/face/enroll", post(handlers::enroll_face))
        .route("/api/face/verify", post(handlers::verify_face))
        .route("/api/ballots", post(handlers::cast_ballot))
        .with_state(app)
}

/// Bind `addr` and serve until the process stops
pub async fn serve(app: Arc<AppContext>, addr: SocketAddr) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| crate::Error::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!(%addr, "🌐 HTTP server listening");
    axum::serve(listener, router(app))
        .await
        .map_err(|e| crate::Error::internal(format!("HTTP server error: {e}")))
}

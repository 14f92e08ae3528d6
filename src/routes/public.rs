use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that work with or without a session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe. Does not touch the backend.
        .route("/health", get(|| async { "ok" }))
        // POST /login
        // Exchanges credentials for a session via the backend.
        .route("/login", post(handlers::login))
        // GET /session
        // Signed-in flag, role and expiry. Never the token.
        .route("/session", get(handlers::session_status))
        // GET /unauthorized
        // Target of every route guard redirect.
        .route("/unauthorized", get(handlers::unauthorized))
}

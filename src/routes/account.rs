use crate::{AppState, handlers};
use axum::{Router, routing::post};

/// Account Router Module
///
/// Endpoints for whoever is signed in, whatever their role. `create_router` wraps
/// them in a guard that only checks for a session.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        // POST /logout
        // Ends the session on the backend, then locally. A mentor or startup session
        // has to be able to sign out even though it cannot see the admin pages.
        .route("/logout", post(handlers::logout))
}

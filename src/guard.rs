use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    models::Role,
    session::{Session, SessionStore},
};

pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

/// Outcome of checking a session against a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

/// RouteGuard
///
/// Lets a request through only when the session is authenticated and, if the guard
/// names one, carries the required role. Everyone else is sent to the unauthorized page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    required_role: Option<Role>,
    unauthorized_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(Role::Admin)
    }
}

impl RouteGuard {
    pub fn new(required_role: Role) -> Self {
        Self {
            required_role: Some(required_role),
            unauthorized_path: UNAUTHORIZED_PATH.to_string(),
        }
    }

    /// Any signed-in session passes, whatever its role.
    pub fn authenticated() -> Self {
        Self {
            required_role: None,
            unauthorized_path: UNAUTHORIZED_PATH.to_string(),
        }
    }

    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        self.unauthorized_path = path.into();
        self
    }

    pub fn required_role(&self) -> Option<&Role> {
        self.required_role.as_ref()
    }

    pub fn check(&self, session: &Session) -> GuardDecision {
        let role_ok = match &self.required_role {
            Some(required) => session.role.as_ref() == Some(required),
            None => true,
        };
        let authorized = session.is_authenticated && role_ok;
        if authorized {
            GuardDecision::Allow
        } else {
            GuardDecision::Redirect(self.unauthorized_path.clone())
        }
    }
}

/// GuardState
///
/// What the `enforce` middleware needs: the guard and the live session.
#[derive(Clone)]
pub struct GuardState {
    pub guard: RouteGuard,
    pub session: SessionStore,
}

impl GuardState {
    pub fn new(guard: RouteGuard, session: SessionStore) -> Self {
        Self { guard, session }
    }
}

/// enforce
///
/// Route-layer middleware. The session is checked before the wrapped handler runs,
/// so a refused request produces nothing but the redirect.
pub async fn enforce(State(state): State<GuardState>, request: Request, next: Next) -> Response {
    match state.guard.check(&state.session.snapshot()) {
        GuardDecision::Allow => next.run(request).await,
        GuardDecision::Redirect(to) => {
            tracing::debug!(
                path = %request.uri().path(),
                required = ?state.guard.required_role(),
                "route guard refused request"
            );
            Redirect::to(&to).into_response()
        }
    }
}

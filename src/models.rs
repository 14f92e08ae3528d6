use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::session::Session;

// --- Roles ---

/// Role
///
/// The RBAC string issued by the backend alongside every token. The dashboard only
/// distinguishes the named roles; anything else is kept verbatim so it can be
/// logged, and never satisfies a guard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Mentor,
    Startup,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Mentor => "mentor",
            Role::Startup => "startup",
            Role::Other(raw) => raw,
        }
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "admin" => Role::Admin,
            "mentor" => Role::Mentor,
            "startup" => Role::Startup,
            _ => Role::Other(raw),
        }
    }
}

impl From<&str> for Role {
    fn from(raw: &str) -> Self {
        Role::from(raw.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Backend Payloads ---

/// TokenGrant
///
/// Body returned by both `POST /api/user/login` and `POST /api/user/refresh-token`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds. Some deployments omit it.
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub role: Role,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>, role: Role, expires_in: Option<u64>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in,
            role,
        }
    }
}

/// LoginRequest
///
/// Credentials forwarded verbatim to the backend login endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// ApiEnvelope
///
/// The `{ success, data }` wrapper every incubator resource endpoint responds with.
/// `message` carries the backend's explanation when `success` is false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

// --- Console Responses ---

/// SessionView
///
/// What the console exposes about the current session. The token itself never
/// leaves the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionView {
    pub is_authenticated: bool,
    #[schema(value_type = Option<String>)]
    pub role: Option<Role>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            is_authenticated: session.is_authenticated,
            role: session.role.clone(),
            expires_at: session.expires_at(),
        }
    }
}

/// ErrorBody
///
/// Documentation-only mirror of the JSON produced by `Error::into_response`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Error
///
/// The single error type shared by the session layer, the authenticated client and
/// the console handlers. Network-level failures are caught where the call is made
/// and surface here; nothing in this crate rethrows through a global boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure: connection refused, timeout, body decoding.
    #[error("request to backend failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend responded with {status}: {message}")]
    Status { status: u16, message: String },

    /// The backend answered 2xx but flagged `success: false` in the envelope.
    #[error("backend rejected the request: {0}")]
    Api(String),

    /// The stored token cannot be expressed as a header value.
    #[error("access token is not a valid header value")]
    InvalidHeader(#[from] axum::http::header::InvalidHeaderValue),

    #[error("session storage failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown resource `{0}`")]
    UnknownResource(String),

    #[error("resource `{0}` is read-only")]
    ReadOnly(String),
}

impl Error {
    /// status_code
    ///
    /// Upstream failures become 502 so the console never masquerades a backend
    /// problem as its own. Local failures are 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Http(_) | Error::Status { .. } | Error::Api(_) => StatusCode::BAD_GATEWAY,
            Error::UnknownResource(_) => StatusCode::NOT_FOUND,
            Error::ReadOnly(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::InvalidHeader(_)
            | Error::Persistence(_)
            | Error::Serialization(_)
            | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        // Same envelope shape the backend uses, so dashboards can treat both alike.
        let body = Json(json!({ "success": false, "message": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

use axum::http::{
    HeaderMap, HeaderValue, Method,
    header::{ACCEPT, AUTHORIZATION},
};
use serde::{Serialize, de::DeserializeOwned};
use std::{sync::Arc, time::Duration};

use crate::{
    cookies::PersistentCookieJar,
    error::{Error, Result},
    models::ApiEnvelope,
    session::SessionStore,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// authorize
///
/// Sets the bearer credential and JSON accept header when a token is present.
/// Without a token the headers are left exactly as they were.
pub fn authorize(headers: &mut HeaderMap, token: Option<&str>) -> Result<()> {
    if let Some(token) = token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    }
    Ok(())
}

/// ApiClient
///
/// Wraps every call to the incubator backend. Call sites never touch the token: it is
/// read from the session store when the request is dispatched, so a request built
/// before a refresh still goes out with the refreshed token.
///
/// The underlying `reqwest::Client` keeps a cookie jar, which is what credentials the
/// refresh and logout endpoints. When the session is persisted the jar is persisted
/// with it, so a restored session can still be refreshed.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(base_url: &str, session: SessionStore) -> Result<Self> {
        let jar = match session.persistence() {
            Some(persistence) => PersistentCookieJar::restore(persistence.clone()),
            None => PersistentCookieJar::in_memory(),
        };
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::new(jar))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_http(http, base_url, session))
    }

    pub fn with_http(http: reqwest::Client, base_url: &str, session: SessionStore) -> Self {
        Self {
            http,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Joins `path` onto the base URL. `path` is expected to start with `/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn request(&self, method: Method, path: &str) -> ApiRequest {
        ApiRequest {
            builder: self.http.request(method, self.url(path)),
            session: self.session.clone(),
        }
    }

    pub fn get(&self, path: &str) -> ApiRequest {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> ApiRequest {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> ApiRequest {
        self.request(Method::PUT, path)
    }

    pub fn delete(&self, path: &str) -> ApiRequest {
        self.request(Method::DELETE, path)
    }
}

/// ApiRequest
///
/// A request that has not been sent yet. Nothing about the session is captured until
/// `send`.
pub struct ApiRequest {
    builder: reqwest::RequestBuilder,
    session: SessionStore,
}

impl ApiRequest {
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.builder = self.builder.json(body);
        self
    }

    pub fn query<T: Serialize + ?Sized>(mut self, params: &T) -> Self {
        self.builder = self.builder.query(params);
        self
    }

    /// send
    ///
    /// Builds the request, attaches the token current at this moment and dispatches it.
    /// The response is returned whatever its status; 401/403 are the caller's to handle.
    pub async fn send(self) -> Result<reqwest::Response> {
        let (http, request) = self.builder.build_split();
        let mut request = request?;
        let token = self.session.access_token();
        authorize(request.headers_mut(), token.as_deref())?;

        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            authorized = token.is_some(),
            "dispatching backend request"
        );

        Ok(http.execute(request).await?)
    }

    /// send_json
    ///
    /// Dispatches and decodes a bare JSON body, turning non-2xx statuses into errors.
    pub async fn send_json<T: DeserializeOwned>(self) -> Result<T> {
        let response = error_for_status(self.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    /// send_envelope
    ///
    /// Dispatches and unwraps a `{ success, data }` envelope. `success: false` is an
    /// error even when the status is 2xx.
    pub async fn send_envelope<T: DeserializeOwned>(self) -> Result<Option<T>> {
        let envelope: ApiEnvelope<T> = self.send_json().await?;
        if !envelope.success {
            return Err(Error::Api(
                envelope
                    .message
                    .unwrap_or_else(|| "request was not successful".to_string()),
            ));
        }
        Ok(envelope.data)
    }

    /// Dispatches and only checks the status, discarding the body.
    pub async fn send_ok(self) -> Result<()> {
        error_for_status(self.send().await?).await?;
        Ok(())
    }
}

/// Maps a non-2xx response to `Error::Status`, keeping the backend's message when it
/// sent one.
async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body)
        .ok()
        .and_then(|envelope| envelope.message)
        .unwrap_or(body);

    Err(Error::Status {
        status: status.as_u16(),
        message,
    })
}

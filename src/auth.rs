use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::Mutex;

use crate::{
    client::ApiClient,
    error::{Error, Result},
    models::{LoginRequest, TokenGrant},
};

pub const LOGIN_PATH: &str = "/api/user/login";
pub const REFRESH_PATH: &str = "/api/user/refresh-token";
pub const LOGOUT_PATH: &str = "/api/user/logout";

// 1. AuthApi Contract
/// AuthApi
///
/// The backend's session endpoints. The scheduler and the console handlers only talk
/// to this trait, so tests swap in `MockAuthApi` without a network.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchanges credentials for a first token. The backend also sets the refresh cookie.
    async fn login(&self, credentials: &LoginRequest) -> Result<TokenGrant>;

    /// Obtains a new token for the current session, credentialed by cookie.
    async fn refresh(&self) -> Result<TokenGrant>;

    /// Ends the session server-side. Does not touch local state.
    async fn logout(&self) -> Result<()>;
}

pub type AuthApiState = Arc<dyn AuthApi>;

// 2. The Real Implementation
/// HttpAuthApi
///
/// Talks to the backend through the authenticated client, so the bearer token and
/// the cookie jar ride along on every call.
#[derive(Clone)]
pub struct HttpAuthApi {
    client: ApiClient,
}

impl HttpAuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &LoginRequest) -> Result<TokenGrant> {
        self.client
            .post(LOGIN_PATH)
            .json(credentials)
            .send_json()
            .await
    }

    async fn refresh(&self) -> Result<TokenGrant> {
        self.client.post(REFRESH_PATH).send_json().await
    }

    async fn logout(&self) -> Result<()> {
        self.client.post(LOGOUT_PATH).send_ok().await
    }
}

// 3. The Mock Implementation (For Tests)
/// MockAuthApi
///
/// Plays back scripted refresh outcomes in order and records how often each endpoint
/// was hit. An exhausted script fails the refresh.
#[derive(Default)]
pub struct MockAuthApi {
    refreshes: Mutex<VecDeque<std::result::Result<TokenGrant, String>>>,
    login_grant: Option<TokenGrant>,
    logout_fails: bool,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl MockAuthApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Login succeeds with `grant`. Without this, login is rejected.
    pub fn with_login(mut self, grant: TokenGrant) -> Self {
        self.login_grant = Some(grant);
        self
    }

    pub fn with_failing_logout(mut self) -> Self {
        self.logout_fails = true;
        self
    }

    pub async fn push_refresh(&self, grant: TokenGrant) {
        self.refreshes.lock().await.push_back(Ok(grant));
    }

    pub async fn push_refresh_failure(&self, message: impl Into<String>) {
        self.refreshes.lock().await.push_back(Err(message.into()));
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn login(&self, _credentials: &LoginRequest) -> Result<TokenGrant> {
        self.login_grant.clone().ok_or_else(|| Error::Status {
            status: 401,
            message: "Mock Auth: invalid credentials".to_string(),
        })
    }

    async fn refresh(&self) -> Result<TokenGrant> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match self.refreshes.lock().await.pop_front() {
            Some(Ok(grant)) => Ok(grant),
            Some(Err(message)) => Err(Error::Status {
                status: 401,
                message,
            }),
            None => Err(Error::Api("Mock Auth: no scripted refresh".to_string())),
        }
    }

    async fn logout(&self) -> Result<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.logout_fails {
            return Err(Error::Status {
                status: 500,
                message: "Mock Auth: logout rejected".to_string(),
            });
        }
        Ok(())
    }
}

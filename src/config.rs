use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::{
    error::{Error, Result},
    models::Role,
    refresh::{DEFAULT_REFRESH_INTERVAL, FailurePolicy, RefreshPolicy},
};

/// AppConfig
///
/// Everything the console reads from its environment, loaded once at startup and
/// cloned into the application state.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Runtime environment marker. Selects log format and how strict loading is.
    pub env: Env,
    // Origin of the incubator REST backend. The only setting that affects the session mechanism.
    pub api_base_url: String,
    // Address the console listens on.
    pub bind_addr: String,
    // Where the session is persisted between restarts.
    pub session_file: PathBuf,
    // Role the admin routes require.
    pub required_role: Role,
    // Timing for the background token refresh.
    pub refresh: RefreshPolicy,
}

/// Env
///
/// `Local` favours convenience (defaults, pretty logs); `Production` insists on
/// explicit settings and logs JSON.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Env {
    /// Reads `APP_ENV`; anything other than `production` is local.
    pub fn from_env() -> Self {
        match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        }
    }
}

pub const LOCAL_API_BASE_URL: &str = "http://localhost:5000";

impl Default for AppConfig {
    /// Safe values for tests. Nothing here touches the environment.
    fn default() -> Self {
        Self {
            env: Env::Local,
            api_base_url: LOCAL_API_BASE_URL.to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            session_file: PathBuf::from(".incubator-session.json"),
            required_role: Role::Admin,
            refresh: RefreshPolicy::default(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Builds the configuration from environment variables. In production a missing
    /// `API_BASE_URL` is an error; locally it falls back to the dev backend. Malformed
    /// numbers are always an error rather than a silent default.
    pub fn load() -> Result<Self> {
        let env = Env::from_env();

        let api_base_url = match (env, env::var("API_BASE_URL")) {
            (_, Ok(url)) if !url.trim().is_empty() => url,
            (Env::Production, _) => {
                return Err(Error::Config(
                    "API_BASE_URL must be set in production".to_string(),
                ));
            }
            (Env::Local, _) => LOCAL_API_BASE_URL.to_string(),
        };
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "API_BASE_URL must be an http(s) URL, got `{api_base_url}`"
            )));
        }

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let session_file = env::var("SESSION_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".incubator-session.json"));
        let required_role = env::var("REQUIRED_ROLE")
            .map(Role::from)
            .unwrap_or(Role::Admin);

        let interval = Duration::from_secs(parse_var(
            "REFRESH_INTERVAL_SECS",
            DEFAULT_REFRESH_INTERVAL.as_secs(),
        )?);
        let use_server_expiry = parse_var("REFRESH_FROM_EXPIRY", false)?;
        let expiry_margin = Duration::from_secs(parse_var("REFRESH_EXPIRY_MARGIN_SECS", 60)?);
        let max_attempts: u32 = parse_var("REFRESH_MAX_ATTEMPTS", 3)?;
        let backoff = Duration::from_secs(parse_var("REFRESH_BACKOFF_SECS", 30)?);

        // Zero attempts keeps the old behaviour: give up silently after one failure.
        let on_failure = if max_attempts == 0 {
            FailurePolicy::Stop
        } else {
            FailurePolicy::Backoff {
                max_attempts,
                base_delay: backoff,
            }
        };

        Ok(Self {
            env,
            api_base_url,
            bind_addr,
            session_file,
            required_role,
            refresh: RefreshPolicy {
                interval,
                use_server_expiry,
                expiry_margin,
                on_failure,
            },
        })
    }
}

/// Parses `name` if set, `default` otherwise.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{name} has an invalid value `{raw}`"))),
        Err(_) => Ok(default),
    }
}

use incubator_admin::{
    AppConfig, Error, FailurePolicy,
    config::{Env, LOCAL_API_BASE_URL},
    models::Role,
};
use serial_test::serial;
use std::{env, panic, path::PathBuf, time::Duration};

const CONFIG_VARS: &[&str] = &[
    "APP_ENV",
    "API_BASE_URL",
    "BIND_ADDR",
    "SESSION_FILE",
    "REQUIRED_ROLE",
    "REFRESH_INTERVAL_SECS",
    "REFRESH_FROM_EXPIRY",
    "REFRESH_EXPIRY_MARGIN_SECS",
    "REFRESH_MAX_ATTEMPTS",
    "REFRESH_BACKOFF_SECS",
];

// --- Setup/Teardown Utilities ---

/// Runs `test` with exactly `vars` set among the config variables, then restores
/// whatever the process had before.
fn run_with_env<T, R>(vars: &[(&str, &str)], test: T) -> R
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    let originals: Vec<(&str, Option<String>)> = CONFIG_VARS
        .iter()
        .map(|&var| (var, env::var(var).ok()))
        .collect();

    unsafe {
        for var in CONFIG_VARS {
            env::remove_var(var);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    let result = panic::catch_unwind(test);

    for (key, original_value) in originals {
        unsafe {
            match original_value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }

    match result {
        Ok(value) => value,
        Err(e) => panic::resume_unwind(e),
    }
}

// --- Tests ---

#[test]
#[serial]
fn test_production_requires_api_base_url() {
    let result = run_with_env(&[("APP_ENV", "production")], AppConfig::load);

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_production_with_api_base_url() {
    let config = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("API_BASE_URL", "https://api.incubator.example"),
        ],
        AppConfig::load,
    )
    .unwrap();

    assert_eq!(config.env, Env::Production);
    assert_eq!(config.api_base_url, "https://api.incubator.example");
}

#[test]
#[serial]
fn test_local_defaults() {
    let config = run_with_env(&[], AppConfig::load).unwrap();

    assert_eq!(config.env, Env::Local);
    assert_eq!(config.api_base_url, LOCAL_API_BASE_URL);
    assert_eq!(config.bind_addr, "0.0.0.0:3000");
    assert_eq!(config.session_file, PathBuf::from(".incubator-session.json"));
    assert_eq!(config.required_role, Role::Admin);
    assert_eq!(config.refresh.interval, Duration::from_secs(14 * 60));
    assert!(!config.refresh.use_server_expiry);
    assert_eq!(
        config.refresh.on_failure,
        FailurePolicy::Backoff {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
        }
    );
}

#[test]
#[serial]
fn test_zero_attempts_stops_after_first_failure() {
    let config = run_with_env(&[("REFRESH_MAX_ATTEMPTS", "0")], AppConfig::load).unwrap();

    assert_eq!(config.refresh.on_failure, FailurePolicy::Stop);
}

#[test]
#[serial]
fn test_refresh_timing_from_env() {
    let config = run_with_env(
        &[
            ("REFRESH_INTERVAL_SECS", "600"),
            ("REFRESH_FROM_EXPIRY", "true"),
            ("REFRESH_EXPIRY_MARGIN_SECS", "90"),
            ("REQUIRED_ROLE", "mentor"),
        ],
        AppConfig::load,
    )
    .unwrap();

    assert_eq!(config.refresh.interval, Duration::from_secs(600));
    assert!(config.refresh.use_server_expiry);
    assert_eq!(config.refresh.expiry_margin, Duration::from_secs(90));
    assert_eq!(config.required_role, Role::Mentor);
}

#[test]
#[serial]
fn test_malformed_number_is_rejected() {
    let result = run_with_env(&[("REFRESH_INTERVAL_SECS", "fourteen")], AppConfig::load);

    match result {
        Err(Error::Config(message)) => assert!(message.contains("REFRESH_INTERVAL_SECS")),
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_non_http_base_url_is_rejected() {
    let result = run_with_env(&[("API_BASE_URL", "localhost:5000")], AppConfig::load);

    assert!(matches!(result, Err(Error::Config(_))));
}

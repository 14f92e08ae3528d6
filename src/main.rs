use incubator_admin::{
    ApiClient, AppState, FileSessionStorage, PersistenceState, SessionStore,
    TokenRefreshScheduler,
    config::{AppConfig, Env},
    create_router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, rehydrates the session, starts the refresh scheduler and serves
/// the console until Ctrl-C.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    // Logging comes up before the rest of the configuration so load errors are logged
    // in the right format.
    let env = Env::from_env();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "incubator_admin=debug,tower_http=info,axum=trace".into());

    match env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    // Fail fast: a console without a backend origin is useless.
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "refusing to start");
            std::process::exit(1);
        }
    };

    tracing::info!(env = ?config.env, backend = %config.api_base_url, "console starting");

    // The session must be rehydrated before anything reads it.
    let storage = Arc::new(FileSessionStorage::new(&config.session_file)) as PersistenceState;
    let session = SessionStore::with_persistence(storage);

    let client = ApiClient::new(&config.api_base_url, session.clone())
        .expect("FATAL: could not build the HTTP client");

    let state = AppState::from_client(config.clone(), client);

    let mut scheduler =
        TokenRefreshScheduler::new(session.clone(), state.auth.clone(), config.refresh);
    scheduler.start();

    let app = create_router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .expect("FATAL: could not bind the listen address");

    tracing::info!("Listening on {}", config.bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server stopped with an error");
    }

    scheduler.stop();
    // Session writes happen on a background task; let the last ones land.
    session.flush().await;
    tracing::info!("console stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

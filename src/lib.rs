use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Session lifecycle.
pub mod session;
pub mod persistence;
pub mod refresh;
pub mod guard;

// Talking to the incubator backend.
pub mod auth;
pub mod client;
pub mod cookies;
pub mod resources;

// Console surface and ambient concerns.
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;

use routes::{account, admin, public};

// --- Public Re-exports ---

pub use auth::{AuthApi, AuthApiState, HttpAuthApi, MockAuthApi};
pub use client::ApiClient;
pub use config::AppConfig;
pub use error::Error;
pub use guard::{GuardDecision, GuardState, RouteGuard};
pub use persistence::{
    FileSessionStorage, MemorySessionStorage, PersistenceHandle, PersistenceState, StoredCookie,
};
pub use refresh::{FailurePolicy, RefreshPolicy, RefreshState, TokenRefreshScheduler};
pub use resources::{Resource, ResourceApi};
pub use session::{Session, SessionStore};

/// ApiDoc
///
/// OpenAPI document for the console's own routes, served at `/api-docs/openapi.json`
/// with Swagger UI on `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::logout, handlers::session_status, handlers::unauthorized,
        handlers::list_resource, handlers::get_resource, handlers::create_resource,
        handlers::update_resource, handlers::delete_resource
    ),
    components(schemas(models::LoginRequest, models::SessionView, models::ErrorBody)),
    tags((name = "incubator-admin", description = "Incubator admin console"))
)]
struct ApiDoc;

/// AppState
///
/// Everything a handler may need, cloned per request. The session store is the
/// same instance the refresh scheduler and the API client hold.
#[derive(Clone)]
pub struct AppState {
    pub session: SessionStore,
    pub auth: AuthApiState,
    pub resources: ResourceApi,
    pub config: AppConfig,
}

impl AppState {
    /// Wires the HTTP-backed services around `client`, sharing its session store.
    pub fn from_client(config: AppConfig, client: ApiClient) -> Self {
        Self {
            session: client.session().clone(),
            auth: Arc::new(HttpAuthApi::new(client.clone())) as AuthApiState,
            resources: ResourceApi::new(client),
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for SessionStore {
    fn from_ref(app_state: &AppState) -> SessionStore {
        app_state.session.clone()
    }
}

impl FromRef<AppState> for AuthApiState {
    fn from_ref(app_state: &AppState) -> AuthApiState {
        app_state.auth.clone()
    }
}

impl FromRef<AppState> for ResourceApi {
    fn from_ref(app_state: &AppState) -> ResourceApi {
        app_state.resources.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles public and guarded routes, the API docs, and the observability layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS: the dashboard front end may be served from anywhere.
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Correlation header shared by the request-id layers and the span below.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Route guards. Both read the live session; only the admin one checks a role.
    let admin_guard = GuardState::new(
        RouteGuard::new(state.config.required_role.clone()),
        state.session.clone(),
    );
    let account_guard = GuardState::new(RouteGuard::authenticated(), state.session.clone());

    // 3. Routes
    let base_router = Router::new()
        // API docs for the console's own surface.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Health, login, session status and the unauthorized page. No guard.
        .merge(public::public_routes())
        // Logout works for every signed-in role, so it only needs a session.
        .merge(
            account::account_routes()
                .route_layer(middleware::from_fn_with_state(account_guard, guard::enforce)),
        )
        // The guard runs before any admin handler; refused requests only see a redirect.
        .merge(
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(admin_guard, guard::enforce)),
        )
        .with_state(state);

    // 4. Observability, outermost so every request gets an id and a span.
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Mint an x-request-id when the caller did not send one.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. One span per request, tagged with that id, latency logged on response.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Echo the id back so dashboard bug reports can quote it.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 5. CORS last, so preflights are answered before anything else runs.
        .layer(cors)
}

/// trace_span_logger
///
/// Span for each request, correlated by the `x-request-id` set above.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

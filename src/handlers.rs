use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::Value;

use crate::{
    AppState,
    error::Result,
    models::{ApiEnvelope, ErrorBody, LoginRequest, SessionView},
    resources::{Resource, ResourceApi},
    session::SessionStore,
};

fn envelope(data: Value) -> Json<ApiEnvelope<Value>> {
    Json(ApiEnvelope {
        success: true,
        data: Some(data),
        message: None,
    })
}

// --- Session Handlers ---

/// login
///
/// [Public Route] Forwards credentials to the backend and, on success, starts a new
/// session in the store. The refresh scheduler picks the new session up on its own.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionView),
        (status = 502, description = "Backend rejected the credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<LoginRequest>,
) -> Result<Json<SessionView>> {
    let grant = state.auth.login(&credentials).await?;
    tracing::info!(role = %grant.role, "login succeeded");
    state
        .session
        .set_auth(grant.access_token, grant.role, grant.expires_in);
    Ok(Json(SessionView::from(&state.session.snapshot())))
}

/// logout
///
/// [Signed-in Route] Ends the session server-side first, for any role. If the backend
/// refuses, the error is returned and the local session stays as it was.
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Signed out", body = SessionView),
        (status = 303, description = "Not signed in"),
        (status = 502, description = "Backend logout failed; still signed in locally", body = ErrorBody)
    )
)]
pub async fn logout(State(state): State<AppState>) -> Result<Json<SessionView>> {
    if let Err(e) = state.auth.logout().await {
        tracing::warn!(error = %e, "backend logout failed, keeping local session");
        return Err(e);
    }
    state.session.logout();
    Ok(Json(SessionView::from(&state.session.snapshot())))
}

/// session_status
///
/// [Public Route] Reports whether the console is signed in and as whom.
#[utoipa::path(
    get,
    path = "/session",
    responses((status = 200, description = "Current session", body = SessionView))
)]
pub async fn session_status(State(session): State<SessionStore>) -> Json<SessionView> {
    Json(SessionView::from(&session.snapshot()))
}

/// unauthorized
///
/// [Public Route] Where the route guard sends refused requests.
#[utoipa::path(
    get,
    path = "/unauthorized",
    responses((status = 403, description = "Not permitted", body = ErrorBody))
)]
pub async fn unauthorized() -> impl IntoResponse {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorBody {
            success: false,
            message: "you are not authorized to view this page".to_string(),
        }),
    )
}

// --- Resource Handlers ---

/// list_resource
///
/// [Admin Route] Lists a collection, e.g. `GET /admin/startups`.
#[utoipa::path(
    get,
    path = "/admin/{resource}",
    params(("resource" = String, Path, description = "startups, mentors, events, trainings, resources, participants, notes or stats")),
    responses(
        (status = 200, description = "Collection"),
        (status = 303, description = "Not signed in as admin"),
        (status = 404, description = "Unknown resource", body = ErrorBody)
    )
)]
pub async fn list_resource(
    State(api): State<ResourceApi>,
    Path(resource): Path<String>,
) -> Result<Json<ApiEnvelope<Value>>> {
    let resource: Resource = resource.parse()?;
    Ok(envelope(api.list(resource).await?))
}

/// get_resource
///
/// [Admin Route] Fetches one item of a collection.
#[utoipa::path(
    get,
    path = "/admin/{resource}/{id}",
    params(
        ("resource" = String, Path, description = "Collection name"),
        ("id" = String, Path, description = "Item id")
    ),
    responses(
        (status = 200, description = "Item"),
        (status = 404, description = "Unknown resource", body = ErrorBody)
    )
)]
pub async fn get_resource(
    State(api): State<ResourceApi>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<Json<ApiEnvelope<Value>>> {
    let resource: Resource = resource.parse()?;
    Ok(envelope(api.fetch(resource, &id).await?))
}

/// create_resource
///
/// [Admin Route] Creates an item. The body is forwarded untouched.
#[utoipa::path(
    post,
    path = "/admin/{resource}",
    params(("resource" = String, Path, description = "Collection name")),
    responses(
        (status = 201, description = "Created"),
        (status = 405, description = "Collection is read-only", body = ErrorBody)
    )
)]
pub async fn create_resource(
    State(api): State<ResourceApi>,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse> {
    let resource: Resource = resource.parse()?;
    let created = api.create(resource, &body).await?;
    Ok((StatusCode::CREATED, envelope(created)))
}

/// update_resource
///
/// [Admin Route] Replaces an item's fields with the forwarded body.
#[utoipa::path(
    put,
    path = "/admin/{resource}/{id}",
    params(
        ("resource" = String, Path, description = "Collection name"),
        ("id" = String, Path, description = "Item id")
    ),
    responses((status = 200, description = "Updated"))
)]
pub async fn update_resource(
    State(api): State<ResourceApi>,
    Path((resource, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<ApiEnvelope<Value>>> {
    let resource: Resource = resource.parse()?;
    Ok(envelope(api.update(resource, &id, &body).await?))
}

/// delete_resource
///
/// [Admin Route] Deletes an item.
#[utoipa::path(
    delete,
    path = "/admin/{resource}/{id}",
    params(
        ("resource" = String, Path, description = "Collection name"),
        ("id" = String, Path, description = "Item id")
    ),
    responses((status = 204, description = "Deleted"))
)]
pub async fn delete_resource(
    State(api): State<ResourceApi>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<StatusCode> {
    let resource: Resource = resource.parse()?;
    api.remove(resource, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

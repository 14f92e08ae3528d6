use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// The dashboard's management surface. The whole router is wrapped in the route guard
/// by `create_router`; handlers here assume an admin session.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /admin/{resource}
        // List or create startups, mentors, events, trainings, resources,
        // participants and notes. `stats` is list-only.
        .route(
            "/admin/{resource}",
            get(handlers::list_resource).post(handlers::create_resource),
        )
        // GET/PUT/DELETE /admin/{resource}/{id}
        .route(
            "/admin/{resource}/{id}",
            get(handlers::get_resource)
                .put(handlers::update_resource)
                .delete(handlers::delete_resource),
        )
}

use crate::api::rest::handlers;
use crate::domain::service::Service;
use axum::{routing::get, Extension, Router};
use std::sync::Arc;

/// Mount the users endpoints and `/health` on `router`.
///
/// | Method | Path          |
/// |--------|---------------|
/// | GET    | `/users`      |
/// | POST   | `/users`      |
/// | GET    | `/users/{id}` |
/// | PUT    | `/users/{id}` |
/// | DELETE | `/users/{id}` |
/// | GET    | `/health`     |
pub fn register_routes(router: Router, service: Arc<Service>) -> Router {
    router
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .layer(Extension(service))
        .route("/health", get(handlers::health))
}

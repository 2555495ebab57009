use axum::{routing::get, Router};

pub mod components;
pub mod courses;
pub mod jobs;
pub mod lessons;
pub mod outlines;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/courses", courses::router())
        .nest("/jobs", jobs::router())
        .nest("/outlines", outlines::router())
        .nest("/lessons", lessons::router())
        .nest("/components", components::router())
}

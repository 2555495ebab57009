//! HTTP API application wiring (Axum router + engine wiring).
//!
//! - `services.rs`: stores, collaborators, provider, orchestrator and worker
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware::{self, GatewayHeaderResolver, IdentityResolver};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, Engine, EngineParts};

/// Build the full HTTP router with the gateway-header identity resolver.
pub fn build_app(services: Arc<AppServices>) -> Router {
    build_app_with_identity(services, Arc::new(GatewayHeaderResolver))
}

pub fn build_app_with_identity(
    services: Arc<AppServices>,
    resolver: Arc<dyn IdentityResolver>,
) -> Router {
    let identity = middleware::IdentityState { resolver };

    // Engine routes: require tenant + user context.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            identity,
            middleware::identity_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}

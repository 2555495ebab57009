use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use courseforge_core::ComponentId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new().route("/:id/regenerate", post(regenerate_component))
}

/// Synchronous: the response carries the rewritten component.
pub async fn regenerate_component(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RegenerateComponentRequest>,
) -> axum::response::Response {
    let component_id: ComponentId = match errors::parse_param("id", &id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .generation
        .regenerate_component(tenant.tenant_id(), component_id, &body.instruction)
        .await
    {
        Ok(component) => Json(component).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

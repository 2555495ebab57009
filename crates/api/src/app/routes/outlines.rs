use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use courseforge_core::OutlineId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{TenantContext, UserContext};

pub fn router() -> Router {
    Router::new().route("/:id/review", post(review_outline))
}

pub async fn review_outline(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReviewOutlineRequest>,
) -> axum::response::Response {
    let outline_id: OutlineId = match errors::parse_param("id", &id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .generation
        .review_outline(tenant.tenant_id(), outline_id, body.decision, user.user_id())
        .await
    {
        Ok(outline) => Json(outline).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

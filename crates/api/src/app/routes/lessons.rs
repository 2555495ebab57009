use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use courseforge_core::OutlineLessonId;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new().route("/:outline_lesson_id", get(get_generated_lesson))
}

pub async fn get_generated_lesson(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(outline_lesson_id): Path<String>,
) -> axum::response::Response {
    let outline_lesson_id: OutlineLessonId =
        match errors::parse_param("outline_lesson_id", &outline_lesson_id) {
            Ok(id) => id,
            Err(resp) => return resp,
        };

    match services
        .generation
        .get_generated_lesson(tenant.tenant_id(), outline_lesson_id)
        .await
    {
        Ok(lesson) => Json(lesson).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

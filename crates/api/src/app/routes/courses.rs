use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use courseforge_core::{CourseId, OutlineLessonId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{TenantContext, UserContext};

pub fn router() -> Router {
    Router::new()
        .route("/:course_id/outline-jobs", post(submit_outline_job))
        .route("/:course_id/lesson-jobs", post(submit_lesson_job))
        .route("/:course_id/outline", get(latest_outline))
        .route("/:course_id/outlines", get(list_outline_versions))
}

pub async fn submit_outline_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(user): Extension<UserContext>,
    Path(course_id): Path<String>,
    Json(body): Json<dto::CreateOutlineJobRequest>,
) -> axum::response::Response {
    let course_id: CourseId = match errors::parse_param("course_id", &course_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .generation
        .submit_outline_job(tenant.tenant_id(), user.user_id(), course_id, body.into())
        .await
    {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(dto::JobAccepted { job_id })).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn submit_lesson_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(user): Extension<UserContext>,
    Path(course_id): Path<String>,
    Json(body): Json<dto::CreateLessonJobRequest>,
) -> axum::response::Response {
    let course_id: CourseId = match errors::parse_param("course_id", &course_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let outline_lesson_id: OutlineLessonId =
        match errors::parse_param("outline_lesson_id", &body.outline_lesson_id) {
            Ok(id) => id,
            Err(resp) => return resp,
        };

    match services
        .generation
        .submit_lesson_job(tenant.tenant_id(), user.user_id(), course_id, outline_lesson_id)
        .await
    {
        Ok(job_id) => (StatusCode::ACCEPTED, Json(dto::JobAccepted { job_id })).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn latest_outline(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(course_id): Path<String>,
) -> axum::response::Response {
    let course_id: CourseId = match errors::parse_param("course_id", &course_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .generation
        .get_latest_outline(tenant.tenant_id(), course_id)
        .await
    {
        Ok(tree) => Json(tree).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_outline_versions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(course_id): Path<String>,
) -> axum::response::Response {
    let course_id: CourseId = match errors::parse_param("course_id", &course_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .generation
        .list_outline_versions(tenant.tenant_id(), course_id)
        .await
    {
        Ok(outlines) => Json(outlines).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

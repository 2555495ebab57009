use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use courseforge_core::JobId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_jobs))
        .route("/stats", get(job_stats))
        .route("/:id", get(get_job))
        .route("/:id/cancel", post(cancel_job))
        .route("/:id/retry", post(retry_job))
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::ListJobsQuery>,
) -> axum::response::Response {
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match services.generation.list_jobs(tenant.tenant_id(), &filter).await {
        Ok(jobs) => {
            let jobs: Vec<dto::JobView> = jobs.into_iter().map(dto::JobView::from).collect();
            Json(jobs).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn job_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    match services.generation.job_stats(tenant.tenant_id()).await {
        Ok(stats) => Json(serde_json::json!({
            "queued": stats.queued,
            "processing": stats.processing,
            "completed": stats.completed,
            "failed": stats.failed,
            "cancelled": stats.cancelled,
            "total": stats.total(),
        }))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id: JobId = match errors::parse_param("id", &id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.generation.get_job(tenant.tenant_id(), job_id).await {
        Ok(job) => Json(dto::JobView::from(job)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn cancel_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id: JobId = match errors::parse_param("id", &id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.generation.cancel_job(tenant.tenant_id(), job_id).await {
        Ok(job) => Json(dto::JobView::from(job)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn retry_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id: JobId = match errors::parse_param("id", &id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.generation.retry_job(tenant.tenant_id(), job_id).await {
        Ok(job) => Json(dto::JobView::from(job)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

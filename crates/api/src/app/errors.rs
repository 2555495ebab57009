use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use courseforge_infra::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        ServiceError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        ServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Provider(msg) => json_error(StatusCode::BAD_GATEWAY, "provider_error", msg),
        ServiceError::Storage(msg) => {
            tracing::error!(error = %msg, "storage error while serving request");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path or query value, answering 400 with the parse error.
pub fn parse_param<T>(name: &'static str, raw: &str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_parameter",
            format!("{name}: {e}"),
        )
    })
}

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use courseforge_core::{TenantId, UserId};

use crate::context::{TenantContext, UserContext};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";

/// Who is calling. Authentication happens upstream; the engine trusts the
/// resolved identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Identity {
    pub tenant_id: TenantId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("missing header {0}")]
    Missing(&'static str),
    #[error("malformed header {header}: {reason}")]
    Malformed { header: &'static str, reason: String },
}

pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Result<Identity, IdentityError>;
}

/// Reads the ids an API gateway forwards in `x-tenant-id` / `x-user-id`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GatewayHeaderResolver;

impl IdentityResolver for GatewayHeaderResolver {
    fn resolve(&self, headers: &HeaderMap) -> Result<Identity, IdentityError> {
        Ok(Identity {
            tenant_id: header_id(headers, TENANT_HEADER)?,
            user_id: header_id(headers, USER_HEADER)?,
        })
    }
}

fn header_id<T>(headers: &HeaderMap, name: &'static str) -> Result<T, IdentityError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = headers.get(name).ok_or(IdentityError::Missing(name))?;
    let value = value.to_str().map_err(|e| IdentityError::Malformed {
        header: name,
        reason: e.to_string(),
    })?;
    let value = value.trim();
    if value.is_empty() {
        return Err(IdentityError::Missing(name));
    }
    value.parse().map_err(|e: T::Err| IdentityError::Malformed {
        header: name,
        reason: e.to_string(),
    })
}

#[derive(Clone)]
pub struct IdentityState {
    pub resolver: Arc<dyn IdentityResolver>,
}

pub async fn identity_middleware(
    State(state): State<IdentityState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let identity = state.resolver.resolve(req.headers()).map_err(|e| {
        tracing::debug!(error = %e, "request rejected without identity");
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut()
        .insert(TenantContext::new(identity.tenant_id));
    req.extensions_mut().insert(UserContext::new(identity.user_id));

    Ok(next.run(req).await)
}

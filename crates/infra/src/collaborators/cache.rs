//! Course cache invalidation hook.

use std::sync::Mutex;

use async_trait::async_trait;

use courseforge_core::{CourseId, TenantId};

use super::CollaboratorError;

/// Keys read-path caches use for a course. Invalidation deletes all of them.
pub fn course_cache_keys(tenant_id: TenantId, course_id: CourseId) -> Vec<String> {
    ["outline", "lessons", "detail"]
        .iter()
        .map(|part| format!("course:{tenant_id}:{course_id}:{part}"))
        .collect()
}

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate_course(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheInvalidator;

#[async_trait]
impl CacheInvalidator for NoopCacheInvalidator {
    async fn invalidate_course(&self, _: TenantId, _: CourseId) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Records invalidated courses (tests).
#[derive(Debug, Default)]
pub struct InMemoryCacheInvalidator {
    invalidated: Mutex<Vec<(TenantId, CourseId)>>,
}

impl InMemoryCacheInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidated(&self) -> Vec<(TenantId, CourseId)> {
        self.invalidated.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CacheInvalidator for InMemoryCacheInvalidator {
    async fn invalidate_course(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<(), CollaboratorError> {
        self.invalidated
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("cache recorder lock poisoned".to_string()))?
            .push((tenant_id, course_id));
        Ok(())
    }
}

/// Redis-backed invalidation using the blocking client on the blocking pool.
#[cfg(feature = "redis")]
#[derive(Debug, Clone)]
pub struct RedisCacheInvalidator {
    client: redis::Client,
}

#[cfg(feature = "redis")]
impl RedisCacheInvalidator {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, CollaboratorError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl CacheInvalidator for RedisCacheInvalidator {
    async fn invalidate_course(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<(), CollaboratorError> {
        use redis::Commands;

        let client = self.client.clone();
        let keys = course_cache_keys(tenant_id, course_id);

        tokio::task::spawn_blocking(move || {
            let mut conn = client
                .get_connection()
                .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;
            let _: i64 = conn
                .del(keys)
                .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| CollaboratorError::Unavailable(format!("cache invalidation task: {e}")))?
    }
}

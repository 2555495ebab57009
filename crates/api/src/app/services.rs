//! Engine wiring: stores, collaborators, provider, orchestrator and worker.

use std::sync::Arc;

use anyhow::Context;
use courseforge_ai::{AiProvider, OpenAiCompatibleProvider};
use courseforge_infra::{
    collaborators::{
        CacheInvalidator, Catalog, InMemoryCatalog, NoopCacheInvalidator, PostgresCatalog,
    },
    content::{ContentStore, InMemoryContentStore, PostgresContentStore},
    db,
    jobs::{InMemoryJobStore, JobStore, PostgresJobStore},
    EngineConfig, GenerationService, Orchestrator, Worker, WorkerConfig,
};

/// Services shared by every request handler.
pub struct AppServices {
    pub generation: GenerationService,
}

/// The ports the engine runs against.
pub struct EngineParts {
    pub jobs: Arc<dyn JobStore>,
    pub content: Arc<dyn ContentStore>,
    pub catalog: Arc<dyn Catalog>,
    pub provider: Arc<dyn AiProvider>,
    pub cache: Arc<dyn CacheInvalidator>,
}

/// Request-side services plus the worker that drains the queue.
pub struct Engine {
    pub services: Arc<AppServices>,
    pub worker: Worker,
}

impl EngineParts {
    /// In-memory stores (dev/test). The catalog and provider come from the caller.
    pub fn in_memory(catalog: Arc<dyn Catalog>, provider: Arc<dyn AiProvider>) -> Self {
        Self {
            jobs: InMemoryJobStore::arc(),
            content: InMemoryContentStore::arc(),
            catalog,
            provider,
            cache: Arc::new(NoopCacheInvalidator),
        }
    }

    /// Postgres-backed stores when `DATABASE_URL` is set, in-memory otherwise.
    pub async fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        let provider: Arc<dyn AiProvider> = Arc::new(
            OpenAiCompatibleProvider::new(
                config.provider.base_url.clone(),
                config.provider.model.clone(),
                config.provider.api_key.clone(),
                config.provider.request_timeout,
            )
            .context("failed to build AI provider")?,
        );

        let mut parts = match &config.database_url {
            Some(url) => {
                let pool = db::connect(url, config.database_max_connections)
                    .await
                    .context("failed to connect to Postgres")?;
                db::apply_schema(&pool)
                    .await
                    .context("failed to apply schema")?;
                let pool = Arc::new(pool);
                tracing::info!("using Postgres stores");
                Self {
                    jobs: Arc::new(PostgresJobStore::new(pool.clone())),
                    content: Arc::new(PostgresContentStore::new(pool.clone())),
                    catalog: Arc::new(PostgresCatalog::new(pool)),
                    provider,
                    cache: Arc::new(NoopCacheInvalidator),
                }
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory stores");
                Self::in_memory(Arc::new(InMemoryCatalog::new()), provider)
            }
        };
        parts.cache = cache_invalidator(config)?;
        Ok(parts)
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }

    pub fn assemble(self, config: &EngineConfig) -> Engine {
        let generation = GenerationService::new(
            self.jobs.clone(),
            self.content.clone(),
            self.catalog.clone(),
            self.provider.clone(),
        )
        .with_cache(self.cache.clone())
        .with_max_retries(config.job_max_retries);

        let orchestrator = Orchestrator::new(self.jobs.clone(), self.content, self.catalog, self.provider)
            .with_cache(self.cache)
            .with_budget(config.knowledge_budget);
        let worker = Worker::new(self.jobs, Arc::new(orchestrator), WorkerConfig::from(config));

        Engine {
            services: Arc::new(AppServices { generation }),
            worker,
        }
    }
}

#[cfg(feature = "redis")]
fn cache_invalidator(config: &EngineConfig) -> anyhow::Result<Arc<dyn CacheInvalidator>> {
    use courseforge_infra::collaborators::RedisCacheInvalidator;

    match &config.redis_url {
        Some(url) => {
            let cache = RedisCacheInvalidator::new(url).context("failed to open Redis client")?;
            tracing::info!("course cache invalidation via Redis");
            Ok(Arc::new(cache))
        }
        None => Ok(Arc::new(NoopCacheInvalidator)),
    }
}

#[cfg(not(feature = "redis"))]
fn cache_invalidator(config: &EngineConfig) -> anyhow::Result<Arc<dyn CacheInvalidator>> {
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL set but the redis feature is disabled; cache invalidation is a no-op");
    }
    Ok(Arc::new(NoopCacheInvalidator))
}

//! Engine configuration, read from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use courseforge_ai::{KnowledgeBudget, DEFAULT_MAX_CHUNKS_PER_SOURCE, DEFAULT_MAX_CHUNK_CHARS};

use crate::jobs::DEFAULT_MAX_RETRIES;

/// Default staleness window for reclaiming `processing` jobs.
pub const DEFAULT_STALE_JOB_AFTER: Duration = Duration::from_secs(600);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// HTTP AI provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub worker_id: String,
    pub poll_interval: Duration,
    pub stale_job_after: Duration,
    pub job_max_retries: u32,
    pub knowledge_budget: KnowledgeBudget,
    pub provider: ProviderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            redis_url: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            worker_id: format!("worker-{}", std::process::id()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_job_after: DEFAULT_STALE_JOB_AFTER,
            job_max_retries: DEFAULT_MAX_RETRIES,
            knowledge_budget: KnowledgeBudget::new(DEFAULT_MAX_CHUNKS_PER_SOURCE, DEFAULT_MAX_CHUNK_CHARS),
            provider: ProviderConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                request_timeout: Duration::from_secs(120),
            },
        }
    }
}

impl EngineConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.database_url = get("DATABASE_URL");
        config.redis_url = get("REDIS_URL");
        if let Some(id) = get("WORKER_ID") {
            config.worker_id = id;
        }
        if let Some(v) = get("DATABASE_MAX_CONNECTIONS") {
            config.database_max_connections = parse("DATABASE_MAX_CONNECTIONS", &v)?;
        }
        if let Some(v) = get("BIND_ADDR") {
            config.bind_addr = parse("BIND_ADDR", &v)?;
        }
        if let Some(v) = get("WORKER_POLL_INTERVAL_SECS") {
            config.poll_interval = secs("WORKER_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("STALE_JOB_AFTER_SECS") {
            config.stale_job_after = secs("STALE_JOB_AFTER_SECS", &v)?;
        }
        if let Some(v) = get("JOB_MAX_RETRIES") {
            config.job_max_retries = parse("JOB_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("KNOWLEDGE_MAX_CHUNKS_PER_SOURCE") {
            config.knowledge_budget.max_chunks_per_source =
                parse("KNOWLEDGE_MAX_CHUNKS_PER_SOURCE", &v)?;
        }
        if let Some(v) = get("KNOWLEDGE_MAX_CHUNK_CHARS") {
            config.knowledge_budget.max_chunk_chars = parse("KNOWLEDGE_MAX_CHUNK_CHARS", &v)?;
        }
        if let Some(v) = get("AI_BASE_URL") {
            config.provider.base_url = v;
        }
        if let Some(v) = get("AI_MODEL") {
            config.provider.model = v;
        }
        config.provider.api_key = get("AI_API_KEY");
        if let Some(v) = get("AI_REQUEST_TIMEOUT_SECS") {
            config.provider.request_timeout = secs("AI_REQUEST_TIMEOUT_SECS", &v)?;
        }

        Ok(config)
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn secs(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = parse(key, value)?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be at least one second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.stale_job_after, Duration::from_secs(600));
        assert_eq!(config.job_max_retries, 3);
        assert_eq!(config.knowledge_budget, KnowledgeBudget::default());
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.worker_id.starts_with("worker-"));
    }

    #[test]
    fn reads_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/cf"),
            ("STALE_JOB_AFTER_SECS", "30"),
            ("JOB_MAX_RETRIES", "5"),
            ("KNOWLEDGE_MAX_CHUNKS_PER_SOURCE", "2"),
            ("WORKER_ID", "replica-a"),
            ("AI_API_KEY", "sk-test"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ]))
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/cf"));
        assert_eq!(config.stale_job_after, Duration::from_secs(30));
        assert_eq!(config.job_max_retries, 5);
        assert_eq!(config.knowledge_budget.max_chunks_per_source, 2);
        assert_eq!(config.worker_id, "replica-a");
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = EngineConfig::from_lookup(lookup(&[("JOB_MAX_RETRIES", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "JOB_MAX_RETRIES", .. }));

        let err = EngineConfig::from_lookup(lookup(&[("WORKER_POLL_INTERVAL_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "WORKER_POLL_INTERVAL_SECS", .. }));
    }
}

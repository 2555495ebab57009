//! Infrastructure layer: job and content stores, collaborators, the step
//! orchestrator, the polling worker and the caller-facing service.

pub mod collaborators;
pub mod config;
pub mod content;
pub mod db;
pub mod generation;
pub mod jobs;
pub mod service;
pub mod worker;

pub use config::{ConfigError, EngineConfig, ProviderConfig};
pub use generation::{GenerationError, JobOutcome, Orchestrator};
pub use service::{GenerationService, OutlineJobRequest, ServiceError};
pub use worker::{Worker, WorkerConfig, WorkerHandle, WorkerStats};

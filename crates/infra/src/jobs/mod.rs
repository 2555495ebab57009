//! Generation job records: lifecycle, claiming, and retry bookkeeping.
//!
//! ## Design
//!
//! - Jobs are tenant-scoped and typed (`outline` | `lesson_content`)
//! - Claiming is an atomic store operation; no in-process coordination
//! - Writes after a claim are conditional on the claim token
//! - Stale claims are reclaimed (spending a retry) or expired as `worker_lost`
//! - Retrying a failed job is an explicit caller action, capped at `max_retries`
//!
//! ## Components
//!
//! - `GenerationJob`: the job record and its pure state transitions
//! - `JobStore`: persistence contract (in-memory or Postgres)

pub mod postgres;
pub mod store;
pub mod types;

pub use postgres::PostgresJobStore;
pub use store::{InMemoryJobStore, JobFilter, JobStats, JobStore, JobStoreError};
pub use types::{
    FailureKind, GenerationJob, JobStage, JobStatus, JobType, DEFAULT_MAX_RETRIES,
};

//! Polling worker: claims jobs from the shared store and runs them.
//!
//! Any number of replicas may run a worker against the same store. Exclusivity
//! comes from `JobStore::claim_next`, never from in-process coordination.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use courseforge_core::TenantId;

use crate::config::{EngineConfig, DEFAULT_POLL_INTERVAL, DEFAULT_STALE_JOB_AFTER};
use crate::generation::{JobOutcome, Orchestrator};
use crate::jobs::{JobStore, JobStoreError};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Stamped on claimed jobs as `claimed_by`.
    pub worker_id: String,
    /// Sleep between polls when no job is available.
    pub poll_interval: Duration,
    /// A `processing` job without a checkpoint for this long is stale.
    pub stale_after: Duration,
    /// Optional tenant filter
    pub tenant_id: Option<TenantId>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", std::process::id()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_after: DEFAULT_STALE_JOB_AFTER,
            tenant_id: None,
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }
}

impl From<&EngineConfig> for WorkerConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            worker_id: config.worker_id.clone(),
            poll_interval: config.poll_interval,
            stale_after: config.stale_job_after,
            tenant_id: None,
        }
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub claims_lost: u64,
    pub jobs_abandoned: u64,
    pub jobs_expired: u64,
    pub uptime_secs: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: JobOutcome) {
        self.jobs_processed += 1;
        match outcome {
            JobOutcome::Completed => self.jobs_completed += 1,
            JobOutcome::Failed(_) => self.jobs_failed += 1,
            JobOutcome::Cancelled => self.jobs_cancelled += 1,
            JobOutcome::ClaimLost => self.claims_lost += 1,
            JobOutcome::Abandoned => self.jobs_abandoned += 1,
        }
    }
}

/// Handle to control a running worker. Dropping it stops the worker once idle.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the in-flight job to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                error!(error = %err, "generation worker task ended abnormally");
            }
        }
    }

    /// Get current worker statistics.
    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Claims and processes one job at a time.
pub struct Worker {
    jobs: Arc<dyn JobStore>,
    orchestrator: Arc<Orchestrator>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(jobs: Arc<dyn JobStore>, orchestrator: Arc<Orchestrator>, config: WorkerConfig) -> Self {
        Self {
            jobs,
            orchestrator,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    fn stale_before(&self) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(self.config.stale_after).unwrap_or(chrono::Duration::MAX);
        Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Fail stale jobs that are out of retries and notify their requesters.
    pub async fn expire_stale(&self) -> Result<usize, JobStoreError> {
        let expired = self.jobs.expire_stale(self.stale_before()).await?;
        for job in &expired {
            warn!(
                worker = %self.config.worker_id,
                job_id = %job.id,
                tenant_id = %job.tenant_id,
                claimed_by = job.claimed_by.as_deref().unwrap_or_default(),
                retry_count = job.retry_count,
                "stale job out of retries, marked worker_lost"
            );
            self.orchestrator.notify(job).await;
        }
        Ok(expired.len())
    }

    /// Claim and process at most one job.
    ///
    /// Returns `None` when nothing was claimable.
    pub async fn run_once(&self) -> Result<Option<JobOutcome>, JobStoreError> {
        let stale_before = self.stale_before();
        match self
            .jobs
            .claim_next(&self.config.worker_id, stale_before, self.config.tenant_id)
            .await?
        {
            Some(job) => {
                debug!(
                    worker = %self.config.worker_id,
                    job_id = %job.id,
                    job_type = %job.job_type,
                    retry_count = job.retry_count,
                    "claimed job"
                );
                Ok(Some(self.orchestrator.process(job).await))
            }
            None => Ok(None),
        }
    }

    /// Spawn the poll loop on the tokio runtime.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let join = tokio::spawn(worker_loop(self, shutdown_rx, stats.clone()));

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn update_stats(stats: &Mutex<WorkerStats>, f: impl FnOnce(&mut WorkerStats)) {
    if let Ok(mut s) = stats.lock() {
        f(&mut s);
    }
}

async fn worker_loop(
    worker: Worker,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    let name = worker.config.worker_id.clone();
    info!(
        worker = %name,
        poll_interval_ms = worker.config.poll_interval.as_millis() as u64,
        stale_after_secs = worker.config.stale_after.as_secs(),
        "generation worker started"
    );
    let start_time = Instant::now();

    loop {
        if *shutdown.borrow() {
            break;
        }

        update_stats(&stats, |s| s.uptime_secs = start_time.elapsed().as_secs());

        match worker.expire_stale().await {
            Ok(0) => {}
            Ok(n) => update_stats(&stats, |s| s.jobs_expired += n as u64),
            Err(e) => error!(worker = %name, error = %e, "failed to expire stale jobs"),
        }

        let idle = match worker.run_once().await {
            Ok(Some(outcome)) => {
                update_stats(&stats, |s| s.record(outcome));
                // Drain the queue before sleeping again.
                false
            }
            Ok(None) => true,
            Err(e) => {
                error!(worker = %name, error = %e, "failed to claim job");
                true
            }
        };

        if idle {
            tokio::select! {
                changed = shutdown.changed() => {
                    // Handle dropped without an explicit shutdown.
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(worker.config.poll_interval) => {}
            }
        }
    }

    info!(worker = %name, "generation worker stopped");
}

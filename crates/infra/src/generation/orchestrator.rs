use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use courseforge_ai::{AiProvider, AudienceProfile, KnowledgeBudget, KnowledgeDigest};
use courseforge_core::{AudienceId, KnowledgeSourceId, TenantId};

use crate::collaborators::{
    CacheInvalidator, Catalog, JobNotification, NoopCacheInvalidator, NotificationSink,
    TracingNotificationSink,
};
use crate::content::ContentStore;
use crate::jobs::{
    FailureKind, GenerationJob, JobStage, JobStatus, JobStore, JobStoreError, JobType,
};

use super::error::GenerationError;

/// How one claimed job attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "failure_kind")]
pub enum JobOutcome {
    Completed,
    Failed(FailureKind),
    /// Cancelled by a caller; observed at a checkpoint.
    Cancelled,
    /// Another worker owns the job now. Nothing was written.
    ClaimLost,
    /// The terminal state could not be persisted; the job is reclaimed once stale.
    Abandoned,
}

/// Runs claimed jobs through their stage pipeline.
///
/// Every stage entry is a persisted checkpoint. Checkpoint writes are
/// conditional on the claim, so a cancelled or reclaimed job stops at its next
/// checkpoint without further writes.
pub struct Orchestrator {
    pub(super) jobs: Arc<dyn JobStore>,
    pub(super) content: Arc<dyn ContentStore>,
    pub(super) catalog: Arc<dyn Catalog>,
    pub(super) provider: Arc<dyn AiProvider>,
    notifier: Arc<dyn NotificationSink>,
    cache: Arc<dyn CacheInvalidator>,
    pub(super) budget: KnowledgeBudget,
}

impl Orchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        content: Arc<dyn ContentStore>,
        catalog: Arc<dyn Catalog>,
        provider: Arc<dyn AiProvider>,
    ) -> Self {
        Self {
            jobs,
            content,
            catalog,
            provider,
            notifier: Arc::new(TracingNotificationSink),
            cache: Arc::new(NoopCacheInvalidator),
            budget: KnowledgeBudget::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_budget(mut self, budget: KnowledgeBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Process a job returned by `JobStore::claim_next` to a terminal state.
    ///
    /// Never returns an error: every failure is recorded on the job.
    pub async fn process(&self, mut job: GenerationJob) -> JobOutcome {
        info!(
            job_id = %job.id,
            tenant_id = %job.tenant_id,
            job_type = %job.job_type,
            retry_count = job.retry_count,
            provider = self.provider.id(),
            "processing job"
        );

        let result = match job.job_type {
            JobType::Outline => self.run_outline(&mut job).await,
            JobType::LessonContent => self.run_lesson(&mut job).await,
        };

        match result {
            Ok(summary) => {
                job.complete(summary);
                match self.save(&job).await {
                    Ok(()) => {
                        info!(
                            job_id = %job.id,
                            tokens_used = job.tokens_used,
                            message = job.progress_message.as_deref().unwrap_or_default(),
                            "job completed"
                        );
                        self.invalidate_course(&job).await;
                        self.notify(&job).await;
                        JobOutcome::Completed
                    }
                    Err(err) => self.stopped(&job, err).await,
                }
            }
            Err(err) => self.stopped(&job, err).await,
        }
    }

    /// Send the terminal notification for `job`. Delivery failures are logged only.
    pub async fn notify(&self, job: &GenerationJob) {
        let notification = JobNotification::from(job);
        if let Err(err) = self.notifier.notify(&notification).await {
            warn!(job_id = %job.id, error = %err, "job notification not delivered");
        }
    }

    async fn invalidate_course(&self, job: &GenerationJob) {
        let Some(course_id) = job.course_id else {
            return;
        };
        if let Err(err) = self.cache.invalidate_course(job.tenant_id, course_id).await {
            warn!(job_id = %job.id, course_id = %course_id, error = %err, "cache invalidation failed");
        }
    }

    async fn stopped(&self, job: &GenerationJob, err: GenerationError) -> JobOutcome {
        let Some(kind) = err.failure_kind() else {
            return released(job, &err);
        };

        let mut failed = job.clone();
        failed.fail(kind, err.to_string());
        warn!(
            job_id = %job.id,
            stage = ?job.stage,
            failure_kind = %kind,
            error = %err,
            "job failed"
        );

        match self.jobs.update(&failed).await {
            Ok(()) => {
                self.notify(&failed).await;
                JobOutcome::Failed(kind)
            }
            Err(JobStoreError::ClaimLost(_)) => released(job, &self.lost_claim(job).await),
            Err(store_err) => {
                error!(job_id = %job.id, error = %store_err, "could not record job failure");
                JobOutcome::Abandoned
            }
        }
    }

    /// The claim no longer holds: tell a caller cancel apart from a reclaim.
    async fn lost_claim(&self, job: &GenerationJob) -> GenerationError {
        match self.jobs.get(job.tenant_id, job.id).await {
            Ok(Some(current)) if current.status == JobStatus::Cancelled => {
                GenerationError::Cancelled
            }
            _ => GenerationError::ClaimLost,
        }
    }

    /// Persist `job` under its claim.
    async fn save(&self, job: &GenerationJob) -> Result<(), GenerationError> {
        match self.jobs.update(job).await {
            Ok(()) => Ok(()),
            Err(JobStoreError::ClaimLost(_) | JobStoreError::NotFound(_)) => {
                Err(self.lost_claim(job).await)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Enter `stage` and persist the checkpoint before doing its work.
    pub(super) async fn checkpoint(
        &self,
        job: &mut GenerationJob,
        stage: JobStage,
    ) -> Result<(), GenerationError> {
        job.enter_stage(stage);
        self.save(job).await?;
        debug!(job_id = %job.id, stage = %stage, progress = job.progress, "checkpoint");
        Ok(())
    }

    /// Persist tokens and heartbeat between provider calls of one stage.
    pub(super) async fn heartbeat(&self, job: &mut GenerationJob) -> Result<(), GenerationError> {
        job.touch();
        self.save(job).await?;
        Ok(())
    }

    /// Knowledge digests for the resolvable ids, capped by the budget.
    pub(super) async fn knowledge(
        &self,
        tenant_id: TenantId,
        ids: &[KnowledgeSourceId],
    ) -> Result<Vec<KnowledgeDigest>, GenerationError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sources = self
            .catalog
            .knowledge_sources(tenant_id, ids, self.budget.max_chunks_per_source)
            .await?;
        Ok(sources
            .into_iter()
            .map(|s| self.budget.digest(s.name, s.domain, s.summary, s.chunks))
            .collect())
    }

    /// Audience profiles. Every id must resolve.
    pub(super) async fn audience(
        &self,
        tenant_id: TenantId,
        ids: &[AudienceId],
    ) -> Result<Vec<AudienceProfile>, GenerationError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let audiences = self.catalog.audiences(tenant_id, ids).await?;
        if audiences.len() < ids.len() {
            let missing: Vec<String> = ids
                .iter()
                .filter(|id| !audiences.iter().any(|a| a.id == **id))
                .map(ToString::to_string)
                .collect();
            return Err(GenerationError::NotFound(format!(
                "target audience(s) {}",
                missing.join(", ")
            )));
        }
        Ok(audiences
            .into_iter()
            .map(|a| AudienceProfile {
                name: a.name,
                description: a.description,
            })
            .collect())
    }
}

/// Outcome of an attempt that stopped without a failure of its own.
fn released(job: &GenerationJob, reason: &GenerationError) -> JobOutcome {
    match reason {
        GenerationError::Cancelled => {
            info!(job_id = %job.id, stage = ?job.stage, "job cancelled, stopped at checkpoint");
            JobOutcome::Cancelled
        }
        _ => {
            warn!(job_id = %job.id, "claim lost, another worker owns the job");
            JobOutcome::ClaimLost
        }
    }
}

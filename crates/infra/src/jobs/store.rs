//! Job storage contract and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use courseforge_core::{CourseId, JobId, TenantId};

use super::types::{FailureKind, GenerationJob, JobStatus, JobType};

/// Default page size for [`JobFilter`].
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Durable record of generation jobs.
///
/// Every method that reads or mutates a single tenant's data takes the tenant
/// id and filters on it. `claim_next` and `expire_stale` are worker operations
/// that span tenants unless a tenant filter is given.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `queued` job.
    async fn create(&self, job: GenerationJob) -> Result<JobId, JobStoreError>;

    /// Atomically claim one eligible job for `worker_id`.
    ///
    /// Eligible: `queued`, or `processing` with a heartbeat older than
    /// `stale_before` and retries left. Two concurrent callers never receive
    /// the same job.
    async fn claim_next(
        &self,
        worker_id: &str,
        stale_before: DateTime<Utc>,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<GenerationJob>, JobStoreError>;

    /// Persist the mutable state of a claimed job.
    ///
    /// Only succeeds while the row is still `processing` under the same claim
    /// token, otherwise returns [`JobStoreError::ClaimLost`].
    async fn update(&self, job: &GenerationJob) -> Result<(), JobStoreError>;

    async fn get(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
    ) -> Result<Option<GenerationJob>, JobStoreError>;

    /// Newest first.
    async fn list(
        &self,
        tenant_id: TenantId,
        filter: &JobFilter,
    ) -> Result<Vec<GenerationJob>, JobStoreError>;

    /// Cancel a `queued` or `processing` job.
    async fn cancel(&self, tenant_id: TenantId, job_id: JobId)
        -> Result<GenerationJob, JobStoreError>;

    /// Move a `failed` job back to `queued`, spending one retry.
    async fn retry(&self, tenant_id: TenantId, job_id: JobId)
        -> Result<GenerationJob, JobStoreError>;

    /// Fail stale `processing` jobs that have no retries left.
    async fn expire_stale(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<GenerationJob>, JobStoreError>;

    async fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("invalid job: {0}")]
    Validation(String),
    #[error("cannot {action} job {job_id} in status {from}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        action: &'static str,
    },
    #[error("job {job_id} has used {retry_count} of {max_retries} retries")]
    RetriesExhausted {
        job_id: JobId,
        retry_count: u32,
        max_retries: u32,
    },
    #[error("claim on job {0} was lost")]
    ClaimLost(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Filter for [`JobStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub course_id: Option<CourseId>,
    pub limit: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            job_type: None,
            course_id: None,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl JobFilter {
    pub fn matches(&self, job: &GenerationJob) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.job_type.is_none_or(|t| job.job_type == t)
            && self.course_id.is_none_or(|c| job.course_id == Some(c))
    }
}

/// Job counts per status for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl JobStats {
    pub fn record(&mut self, status: JobStatus, count: usize) {
        match status {
            JobStatus::Queued => self.queued += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
            JobStatus::Cancelled => self.cancelled += count,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.processing + self.completed + self.failed + self.cancelled
    }
}

/// Error written on jobs failed by [`JobStore::expire_stale`].
pub(crate) fn worker_lost_message(job: &GenerationJob) -> String {
    format!(
        "worker {} stopped checkpointing and the job has used {} of {} retries; \
         provider calls from the last attempt may have been partially applied",
        job.claimed_by.as_deref().unwrap_or("unknown"),
        job.retry_count,
        job.max_retries
    )
}

/// In-memory job store for tests/dev.
///
/// A single write lock around the map makes `claim_next` atomic.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, GenerationJob>>,
}

fn poisoned<T>(_: T) -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Apply `f` to one tenant's job under the write lock.
    fn mutate<F>(&self, tenant_id: TenantId, job_id: JobId, f: F) -> Result<GenerationJob, JobStoreError>
    where
        F: FnOnce(&mut GenerationJob) -> Result<(), JobStoreError>,
    {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let job = jobs
            .get_mut(&job_id)
            .filter(|j| j.tenant_id == tenant_id)
            .ok_or(JobStoreError::NotFound(job_id))?;
        f(job)?;
        Ok(job.clone())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: GenerationJob) -> Result<JobId, JobStoreError> {
        job.validate()?;
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        stale_before: DateTime<Utc>,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<GenerationJob>, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;

        // FIFO by creation time
        let next = jobs
            .values()
            .filter(|j| j.is_claimable(stale_before) && tenant_id.is_none_or(|t| j.tenant_id == t))
            .min_by_key(|j| (j.created_at, j.id))
            .map(|j| j.id);

        Ok(next.and_then(|id| jobs.get_mut(&id)).map(|job| {
            job.claim(worker_id);
            job.clone()
        }))
    }

    async fn update(&self, job: &GenerationJob) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let stored = jobs
            .get_mut(&job.id)
            .filter(|j| j.tenant_id == job.tenant_id)
            .ok_or(JobStoreError::NotFound(job.id))?;

        if stored.status != JobStatus::Processing
            || job.claim_token.is_none()
            || stored.claim_token != job.claim_token
        {
            return Err(JobStoreError::ClaimLost(job.id));
        }

        stored.status = job.status;
        stored.stage = job.stage;
        stored.progress = job.progress;
        stored.progress_message = job.progress_message.clone();
        stored.tokens_used = job.tokens_used;
        stored.error = job.error.clone();
        stored.failure_kind = job.failure_kind;
        stored.completed_at = job.completed_at;
        stored.heartbeat_at = job.heartbeat_at;
        stored.updated_at = job.updated_at;
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
    ) -> Result<Option<GenerationJob>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs
            .get(&job_id)
            .filter(|j| j.tenant_id == tenant_id)
            .cloned())
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        filter: &JobFilter,
    ) -> Result<Vec<GenerationJob>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id && filter.matches(j))
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        result.truncate(filter.limit);
        Ok(result)
    }

    async fn cancel(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
    ) -> Result<GenerationJob, JobStoreError> {
        self.mutate(tenant_id, job_id, GenerationJob::cancel)
    }

    async fn retry(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
    ) -> Result<GenerationJob, JobStoreError> {
        self.mutate(tenant_id, job_id, GenerationJob::requeue_for_retry)
    }

    async fn expire_stale(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<GenerationJob>, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let mut expired = Vec::new();
        for job in jobs.values_mut() {
            if job.is_stale(stale_before) && !job.retries_left() {
                let message = worker_lost_message(job);
                job.fail(FailureKind::WorkerLost, message);
                expired.push(job.clone());
            }
        }
        Ok(expired)
    }

    async fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| j.tenant_id == tenant_id) {
            stats.record(job.status, 1);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use courseforge_core::{GenerationInputId, UserId};

    fn test_tenant() -> TenantId {
        TenantId::new()
    }

    fn outline_job(tenant: TenantId) -> GenerationJob {
        GenerationJob::new_outline(tenant, UserId::new(), CourseId::new(), GenerationInputId::new())
    }

    fn not_stale() -> DateTime<Utc> {
        Utc::now() - Duration::minutes(10)
    }

    #[tokio::test]
    async fn create_and_claim() {
        let store = InMemoryJobStore::new();
        let tenant = test_tenant();

        let job_id = store.create(outline_job(tenant)).await.unwrap();

        let claimed = store.claim_next("w1", not_stale(), None).await.unwrap().unwrap();
        assert_eq!(claimed.id, job_id);
        assert_eq!(claimed.status, JobStatus::Processing);
        assert!(claimed.started_at.is_some());
        assert_eq!(claimed.claimed_by.as_deref(), Some("w1"));

        // No more jobs
        assert!(store.claim_next("w1", not_stale(), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_rejects_invalid_job() {
        let store = InMemoryJobStore::new();
        let mut job = outline_job(test_tenant());
        job.course_id = None;

        assert!(matches!(store.create(job).await, Err(JobStoreError::Validation(_))));
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let store = InMemoryJobStore::new();
        let tenant1 = test_tenant();
        let tenant2 = test_tenant();

        let job_id = store.create(outline_job(tenant1)).await.unwrap();

        assert!(store.get(tenant1, job_id).await.unwrap().is_some());
        assert!(store.get(tenant2, job_id).await.unwrap().is_none());
        assert!(matches!(
            store.cancel(tenant2, job_id).await,
            Err(JobStoreError::NotFound(_))
        ));
        assert!(store.claim_next("w1", not_stale(), Some(tenant2)).await.unwrap().is_none());
        assert_eq!(store.stats(tenant2).await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn update_requires_live_claim() {
        let store = InMemoryJobStore::new();
        let tenant = test_tenant();
        store.create(outline_job(tenant)).await.unwrap();

        let mut claimed = store.claim_next("w1", not_stale(), None).await.unwrap().unwrap();
        claimed.progress = 40;
        store.update(&claimed).await.unwrap();

        store.cancel(tenant, claimed.id).await.unwrap();

        claimed.progress = 70;
        assert!(matches!(
            store.update(&claimed).await,
            Err(JobStoreError::ClaimLost(_))
        ));
        let stored = store.get(tenant, claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert_eq!(stored.progress, 40);
    }

    #[tokio::test]
    async fn reclaimed_job_rejects_old_worker() {
        let store = InMemoryJobStore::new();
        let tenant = test_tenant();
        store.create(outline_job(tenant)).await.unwrap();

        let old = store.claim_next("w1", not_stale(), None).await.unwrap().unwrap();

        let future = Utc::now() + Duration::seconds(1);
        let new = store.claim_next("w2", future, None).await.unwrap().unwrap();
        assert_eq!(new.id, old.id);
        assert_eq!(new.retry_count, 1);

        assert!(matches!(store.update(&old).await, Err(JobStoreError::ClaimLost(_))));
        store.update(&new).await.unwrap();
    }

    #[tokio::test]
    async fn expire_stale_fails_jobs_at_cap() {
        let store = InMemoryJobStore::new();
        let tenant = test_tenant();
        store.create(outline_job(tenant).with_max_retries(0)).await.unwrap();
        let claimed = store.claim_next("w1", not_stale(), None).await.unwrap().unwrap();

        let future = Utc::now() + Duration::seconds(1);
        assert!(store.claim_next("w2", future, None).await.unwrap().is_none());

        let expired = store.expire_stale(future).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, claimed.id);
        assert_eq!(expired[0].status, JobStatus::Failed);
        assert_eq!(expired[0].failure_kind, Some(FailureKind::WorkerLost));
        assert!(expired[0].completed_at.is_some());

        assert!(matches!(
            store.retry(tenant, claimed.id).await,
            Err(JobStoreError::RetriesExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn retry_requeues_failed_job() {
        let store = InMemoryJobStore::new();
        let tenant = test_tenant();
        store.create(outline_job(tenant)).await.unwrap();

        let mut claimed = store.claim_next("w1", not_stale(), None).await.unwrap().unwrap();
        claimed.fail(FailureKind::Provider, "boom");
        store.update(&claimed).await.unwrap();

        let retried = store.retry(tenant, claimed.id).await.unwrap();
        assert_eq!(retried.status, JobStatus::Queued);
        assert_eq!(retried.retry_count, 1);
        assert!(retried.error.is_none());

        let reclaimed = store.claim_next("w1", not_stale(), None).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, claimed.id);
        assert_eq!(reclaimed.retry_count, 1);
    }

    #[tokio::test]
    async fn list_filters_newest_first() {
        let store = InMemoryJobStore::new();
        let tenant = test_tenant();
        let course = CourseId::new();

        let first =
            GenerationJob::new_outline(tenant, UserId::new(), course, GenerationInputId::new());
        let mut second =
            GenerationJob::new_outline(tenant, UserId::new(), course, GenerationInputId::new());
        second.created_at = first.created_at + Duration::seconds(1);
        store.create(first.clone()).await.unwrap();
        store.create(second.clone()).await.unwrap();
        store.create(outline_job(tenant)).await.unwrap();

        let filter = JobFilter {
            course_id: Some(course),
            ..Default::default()
        };
        let listed = store.list(tenant, &filter).await.unwrap();
        assert_eq!(
            listed.iter().map(|j| j.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );

        let filter = JobFilter {
            status: Some(JobStatus::Completed),
            ..Default::default()
        };
        assert!(store.list(tenant, &filter).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_never_share_a_job() {
        let store = InMemoryJobStore::arc();
        let tenant = test_tenant();
        let job_id = store.create(outline_job(tenant)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .claim_next(&format!("w{i}"), not_stale(), None)
                    .await
                    .unwrap()
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            if let Some(job) = handle.await.unwrap() {
                winners.push(job.id);
            }
        }
        assert_eq!(winners, vec![job_id]);
    }
}

//! Generation job record and its state transitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courseforge_core::{
    CourseId, DomainError, GenerationInputId, JobId, OutlineLessonId, TenantId, UserId,
};

use super::store::JobStoreError;

/// Retries allowed for a job unless configured otherwise.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed by a worker
    Queued,
    /// Claimed and being advanced by exactly one worker
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| DomainError::unknown_variant("job status", s))
    }
}

/// What artifact a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Outline,
    LessonContent,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Outline => "outline",
            JobType::LessonContent => "lesson_content",
        }
    }

    /// Processing sub-states in the order a worker walks through them.
    pub fn stages(&self) -> &'static [JobStage] {
        match self {
            JobType::Outline => &[
                JobStage::GatheringKnowledge,
                JobStage::AnalyzingAudience,
                JobStage::Generating,
                JobStage::Storing,
            ],
            JobType::LessonContent => &[
                JobStage::LoadingContext,
                JobStage::Generating,
                JobStage::Storing,
            ],
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outline" => Ok(JobType::Outline),
            "lesson_content" => Ok(JobType::LessonContent),
            other => Err(DomainError::unknown_variant("job type", other)),
        }
    }
}

/// Sub-state of a `processing` job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    GatheringKnowledge,
    AnalyzingAudience,
    LoadingContext,
    Generating,
    Storing,
}

impl JobStage {
    const ALL: [JobStage; 5] = [
        JobStage::GatheringKnowledge,
        JobStage::AnalyzingAudience,
        JobStage::LoadingContext,
        JobStage::Generating,
        JobStage::Storing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::GatheringKnowledge => "gathering_knowledge",
            JobStage::AnalyzingAudience => "analyzing_audience",
            JobStage::LoadingContext => "loading_context",
            JobStage::Generating => "generating",
            JobStage::Storing => "storing",
        }
    }

    /// Progress written when a job of `job_type` enters this stage.
    pub fn checkpoint(&self, job_type: JobType) -> u8 {
        match (job_type, self) {
            (JobType::Outline, JobStage::GatheringKnowledge) => 10,
            (JobType::Outline, JobStage::AnalyzingAudience) => 20,
            (JobType::Outline, JobStage::Generating) => 40,
            (JobType::LessonContent, JobStage::LoadingContext) => 10,
            (JobType::LessonContent, JobStage::Generating) => 30,
            (_, JobStage::Storing) => 70,
            // Stages outside a type's pipeline never move progress.
            _ => 0,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JobStage::GatheringKnowledge => "Gathering knowledge sources",
            JobStage::AnalyzingAudience => "Analyzing target audience",
            JobStage::LoadingContext => "Loading lesson context",
            JobStage::Generating => "Generating content",
            JobStage::Storing => "Storing results",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStage {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStage::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| DomainError::unknown_variant("job stage", s))
    }
}

/// Error class recorded on a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    NotFound,
    Provider,
    Store,
    /// The claiming worker stopped heartbeating and the retry budget is spent.
    WorkerLost,
}

impl FailureKind {
    const ALL: [FailureKind; 5] = [
        FailureKind::Validation,
        FailureKind::NotFound,
        FailureKind::Provider,
        FailureKind::Store,
        FailureKind::WorkerLost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::NotFound => "not_found",
            FailureKind::Provider => "provider",
            FailureKind::Store => "store",
            FailureKind::WorkerLost => "worker_lost",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureKind::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| DomainError::unknown_variant("failure kind", s))
    }
}

/// One attempt to produce one artifact.
///
/// Rows are never deleted; a job only ever reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub requested_by: UserId,
    pub job_type: JobType,
    pub course_id: Option<CourseId>,
    pub outline_lesson_id: Option<OutlineLessonId>,
    /// Frozen parameters an outline job runs with.
    pub generation_input_id: Option<GenerationInputId>,

    pub status: JobStatus,
    pub stage: Option<JobStage>,
    pub progress: u8,
    pub progress_message: Option<String>,
    pub tokens_used: u64,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,

    pub max_retries: u32,
    pub retry_count: u32,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub heartbeat_at: Option<DateTime<Utc>>,

    pub claimed_by: Option<String>,
    pub claim_token: Option<Uuid>,
}

impl GenerationJob {
    fn queued(
        tenant_id: TenantId,
        requested_by: UserId,
        job_type: JobType,
        course_id: Option<CourseId>,
        outline_lesson_id: Option<OutlineLessonId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tenant_id,
            requested_by,
            job_type,
            course_id,
            outline_lesson_id,
            generation_input_id: None,
            status: JobStatus::Queued,
            stage: None,
            progress: 0,
            progress_message: Some("Queued".to_string()),
            tokens_used: 0,
            error: None,
            failure_kind: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_count: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            heartbeat_at: None,
            claimed_by: None,
            claim_token: None,
        }
    }

    pub fn new_outline(
        tenant_id: TenantId,
        requested_by: UserId,
        course_id: CourseId,
        generation_input_id: GenerationInputId,
    ) -> Self {
        let mut job = Self::queued(tenant_id, requested_by, JobType::Outline, Some(course_id), None);
        job.generation_input_id = Some(generation_input_id);
        job
    }

    pub fn new_lesson(
        tenant_id: TenantId,
        requested_by: UserId,
        course_id: CourseId,
        outline_lesson_id: OutlineLessonId,
    ) -> Self {
        Self::queued(
            tenant_id,
            requested_by,
            JobType::LessonContent,
            Some(course_id),
            Some(outline_lesson_id),
        )
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Checks a freshly built job before it is persisted.
    pub fn validate(&self) -> Result<(), JobStoreError> {
        if self.tenant_id.as_uuid().is_nil() {
            return Err(JobStoreError::Validation("tenant id is required".to_string()));
        }
        if self.status != JobStatus::Queued || self.progress != 0 || self.started_at.is_some() {
            return Err(JobStoreError::Validation(
                "new jobs must be queued with no progress".to_string(),
            ));
        }
        match self.job_type {
            JobType::Outline if self.course_id.is_none() => Err(JobStoreError::Validation(
                "outline jobs require a course id".to_string(),
            )),
            JobType::Outline if self.generation_input_id.is_none() => Err(JobStoreError::Validation(
                "outline jobs require generation input".to_string(),
            )),
            JobType::LessonContent if self.outline_lesson_id.is_none() => {
                Err(JobStoreError::Validation(
                    "lesson jobs require an outline lesson id".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// A claimed job whose worker stopped checkpointing before `stale_before`.
    pub fn is_stale(&self, stale_before: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing
            && self.heartbeat_at.or(self.started_at).is_some_and(|t| t < stale_before)
    }

    pub fn retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Eligible for `claim_next`: queued, or stale with retry budget left.
    pub fn is_claimable(&self, stale_before: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Queued => true,
            JobStatus::Processing => self.is_stale(stale_before) && self.retries_left(),
            _ => false,
        }
    }

    /// Take ownership for `worker_id`. Reclaiming a stale job counts as a retry.
    pub fn claim(&mut self, worker_id: &str) {
        let now = Utc::now();
        if self.status == JobStatus::Processing {
            self.retry_count += 1;
        }
        self.status = JobStatus::Processing;
        self.stage = None;
        self.started_at.get_or_insert(now);
        self.heartbeat_at = Some(now);
        self.updated_at = now;
        self.claimed_by = Some(worker_id.to_string());
        self.claim_token = Some(Uuid::new_v4());
        self.progress_message = Some(format!("Claimed by {worker_id}"));
    }

    /// Move to `stage`, raising progress to its checkpoint (never lowering it).
    pub fn enter_stage(&mut self, stage: JobStage) {
        let now = Utc::now();
        self.stage = Some(stage);
        self.progress = self.progress.max(stage.checkpoint(self.job_type));
        self.progress_message = Some(stage.message().to_string());
        self.heartbeat_at = Some(now);
        self.updated_at = now;
    }

    pub fn touch(&mut self) {
        let now = Utc::now();
        self.heartbeat_at = Some(now);
        self.updated_at = now;
    }

    pub fn add_tokens(&mut self, tokens: u64) {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
    }

    pub fn complete(&mut self, message: impl Into<String>) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.stage = None;
        self.progress = 100;
        self.progress_message = Some(message.into());
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Record a terminal failure. The stage is kept to show where it happened.
    pub fn fail(&mut self, kind: FailureKind, error: impl Into<String>) {
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.failure_kind = Some(kind);
        self.progress_message = Some(match self.stage {
            Some(stage) => format!("Failed while {}", stage.message().to_lowercase()),
            None => "Failed".to_string(),
        });
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn cancel(&mut self) -> Result<(), JobStoreError> {
        if !self.status.is_cancellable() {
            return Err(JobStoreError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                action: "cancel",
            });
        }
        let now = Utc::now();
        self.status = JobStatus::Cancelled;
        self.progress_message = Some("Cancelled".to_string());
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Re-enqueue a failed job, spending one retry.
    pub fn requeue_for_retry(&mut self) -> Result<(), JobStoreError> {
        if self.status != JobStatus::Failed {
            return Err(JobStoreError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                action: "retry",
            });
        }
        if !self.retries_left() {
            return Err(JobStoreError::RetriesExhausted {
                job_id: self.id,
                retry_count: self.retry_count,
                max_retries: self.max_retries,
            });
        }
        self.status = JobStatus::Queued;
        self.retry_count += 1;
        self.stage = None;
        self.error = None;
        self.failure_kind = None;
        self.completed_at = None;
        self.heartbeat_at = None;
        self.claimed_by = None;
        self.claim_token = None;
        self.progress_message = Some("Queued for retry".to_string());
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn outline_job() -> GenerationJob {
        GenerationJob::new_outline(
            TenantId::new(),
            UserId::new(),
            CourseId::new(),
            GenerationInputId::new(),
        )
    }

    #[test]
    fn job_lifecycle() {
        let mut job = outline_job();
        assert!(job.validate().is_ok());
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.started_at.is_none());

        job.claim("w1");
        assert_eq!(job.status, JobStatus::Processing);
        let started = job.started_at;
        assert!(started.is_some());
        assert!(job.claim_token.is_some());

        for stage in JobType::Outline.stages() {
            job.enter_stage(*stage);
        }
        assert_eq!(job.progress, 70);

        job.complete("done");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
        assert_eq!(job.started_at, started);
    }

    #[test]
    fn lesson_job_requires_outline_lesson() {
        let mut job = GenerationJob::new_lesson(
            TenantId::new(),
            UserId::new(),
            CourseId::new(),
            OutlineLessonId::new(),
        );
        assert!(job.validate().is_ok());

        job.outline_lesson_id = None;
        assert!(matches!(job.validate(), Err(JobStoreError::Validation(_))));
    }

    #[test]
    fn outline_job_requires_generation_input() {
        let mut job = outline_job();
        assert!(job.generation_input_id.is_some());

        job.generation_input_id = None;
        assert!(matches!(job.validate(), Err(JobStoreError::Validation(_))));
    }

    #[test]
    fn nil_tenant_is_rejected() {
        let job = GenerationJob::new_outline(
            TenantId::from_uuid(Uuid::nil()),
            UserId::new(),
            CourseId::new(),
            GenerationInputId::new(),
        );
        assert!(matches!(job.validate(), Err(JobStoreError::Validation(_))));
    }

    #[test]
    fn cancel_only_from_queued_or_processing() {
        let mut job = outline_job();
        job.claim("w1");
        job.complete("done");

        let err = job.cancel().unwrap_err();
        assert!(matches!(
            err,
            JobStoreError::InvalidTransition {
                from: JobStatus::Completed,
                ..
            }
        ));
        assert_eq!(job.status, JobStatus::Completed);

        let mut queued = outline_job();
        queued.cancel().unwrap();
        assert_eq!(queued.status, JobStatus::Cancelled);
        assert!(queued.completed_at.is_some());
    }

    #[test]
    fn retry_respects_max_retries() {
        let mut job = outline_job().with_max_retries(1);
        job.claim("w1");
        job.fail(FailureKind::Provider, "boom");

        job.requeue_for_retry().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.retry_count, 1);
        assert!(job.error.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.started_at.is_some());

        job.claim("w1");
        job.fail(FailureKind::Provider, "boom again");
        assert!(matches!(
            job.requeue_for_retry(),
            Err(JobStoreError::RetriesExhausted { .. })
        ));
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn stale_reclaim_counts_as_retry() {
        let mut job = outline_job();
        job.claim("w1");
        let first_token = job.claim_token;

        let later = Utc::now() + Duration::seconds(1);
        assert!(job.is_stale(later));
        assert!(job.is_claimable(later));

        job.claim("w2");
        assert_eq!(job.retry_count, 1);
        assert_ne!(job.claim_token, first_token);
        assert_eq!(job.claimed_by.as_deref(), Some("w2"));
    }

    #[test]
    fn stale_job_at_cap_is_not_claimable() {
        let mut job = outline_job().with_max_retries(0);
        job.claim("w1");
        let later = Utc::now() + Duration::seconds(1);
        assert!(job.is_stale(later));
        assert!(!job.is_claimable(later));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("running".parse::<JobStatus>().is_err());
        assert_eq!("lesson_content".parse::<JobType>().unwrap(), JobType::LessonContent);
        assert_eq!("worker_lost".parse::<FailureKind>().unwrap(), FailureKind::WorkerLost);
    }

    fn any_stage() -> impl Strategy<Value = JobStage> {
        prop::sample::select(JobStage::ALL.to_vec())
    }

    fn any_job_type() -> impl Strategy<Value = JobType> {
        prop_oneof![Just(JobType::Outline), Just(JobType::LessonContent)]
    }

    proptest! {
        #[test]
        fn progress_never_decreases_while_processing(
            job_type in any_job_type(),
            stages in prop::collection::vec(any_stage(), 0..20),
        ) {
            let mut job = match job_type {
                JobType::Outline => outline_job(),
                JobType::LessonContent => GenerationJob::new_lesson(
                    TenantId::new(), UserId::new(), CourseId::new(), OutlineLessonId::new(),
                ),
            };
            job.claim("w1");

            let mut last = job.progress;
            for stage in stages {
                job.enter_stage(stage);
                prop_assert!(job.progress >= last);
                prop_assert!(job.progress < 100);
                last = job.progress;
            }
        }

        #[test]
        fn failed_job_at_cap_is_never_requeued(max_retries in 0u32..5, extra in 0u32..3) {
            let mut job = outline_job().with_max_retries(max_retries);
            job.retry_count = max_retries + extra;
            job.claim("w1");
            job.fail(FailureKind::Provider, "boom");

            prop_assert!(job.requeue_for_retry().is_err());
            prop_assert_eq!(job.status, JobStatus::Failed);
            prop_assert!(!job.is_claimable(Utc::now() + Duration::days(1)));
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courseforge_core::{
    ApprovalStatus, AudienceId, CourseId, JobId, KnowledgeSourceId, OutlineLessonId,
};
use courseforge_infra::jobs::{
    FailureKind, GenerationJob, JobFilter, JobStage, JobStatus, JobType,
};
use courseforge_infra::OutlineJobRequest;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateOutlineJobRequest {
    pub knowledge_source_ids: Vec<KnowledgeSourceId>,
    #[serde(default)]
    pub audience_ids: Vec<AudienceId>,
    pub desired_outcome: String,
    pub additional_context: Option<String>,
}

impl From<CreateOutlineJobRequest> for OutlineJobRequest {
    fn from(body: CreateOutlineJobRequest) -> Self {
        Self {
            knowledge_source_ids: body.knowledge_source_ids,
            audience_ids: body.audience_ids,
            desired_outcome: body.desired_outcome,
            additional_context: body.additional_context,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLessonJobRequest {
    pub outline_lesson_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewOutlineRequest {
    pub decision: ApprovalStatus,
}

#[derive(Debug, Deserialize)]
pub struct RegenerateComponentRequest {
    pub instruction: String,
}

/// `GET /jobs` query string. Values are parsed by hand so bad input gets the
/// JSON error shape.
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub job_type: Option<String>,
    pub course_id: Option<String>,
    pub limit: Option<usize>,
}

impl ListJobsQuery {
    pub fn into_filter(self) -> Result<JobFilter, axum::response::Response> {
        let mut filter = JobFilter::default();
        if let Some(status) = self.status.as_deref() {
            filter.status = Some(errors::parse_param("status", status)?);
        }
        if let Some(job_type) = self.job_type.as_deref() {
            filter.job_type = Some(errors::parse_param("job_type", job_type)?);
        }
        if let Some(course_id) = self.course_id.as_deref() {
            filter.course_id = Some(errors::parse_param("course_id", course_id)?);
        }
        if let Some(limit) = self.limit {
            filter.limit = limit.clamp(1, MAX_LIST_LIMIT);
        }
        Ok(filter)
    }
}

pub const MAX_LIST_LIMIT: usize = 200;

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
}

/// Job as callers see it. Worker bookkeeping (claim, heartbeat) stays internal.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub job_type: JobType,
    pub course_id: Option<CourseId>,
    pub outline_lesson_id: Option<OutlineLessonId>,
    pub status: JobStatus,
    pub stage: Option<JobStage>,
    pub progress: u8,
    pub progress_message: Option<String>,
    pub tokens_used: u64,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<GenerationJob> for JobView {
    fn from(job: GenerationJob) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            course_id: job.course_id,
            outline_lesson_id: job.outline_lesson_id,
            status: job.status,
            stage: job.stage,
            progress: job.progress,
            progress_message: job.progress_message,
            tokens_used: job.tokens_used,
            error: job.error,
            failure_kind: job.failure_kind,
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            updated_at: job.updated_at,
        }
    }
}

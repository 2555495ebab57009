//! Caller-facing operations of the generation engine.
//!
//! Submission validates synchronously and only then creates a `queued` job;
//! everything slow happens later in a worker. Reads and reviews go straight to
//! the stores, always scoped by the caller's tenant.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use courseforge_ai::{
    AiError, AiProvider, AudienceProfile, ComponentRegenerationRequest, LessonContext,
};
use courseforge_core::{
    ApprovalStatus, AudienceId, ComponentId, CourseId, GenerationInputId, JobId,
    KnowledgeSourceId, OutlineId, OutlineLessonId, TenantId, UserId,
};

use crate::collaborators::{CacheInvalidator, Catalog, CollaboratorError, NoopCacheInvalidator};
use crate::content::{
    ContentStore, ContentStoreError, CourseGenerationInput, CourseOutline, LessonComponent,
    LessonWithComponents, OutlineTree,
};
use crate::generation::outline_input;
use crate::jobs::{
    GenerationJob, JobFilter, JobStats, JobStore, JobStoreError, DEFAULT_MAX_RETRIES,
};

/// Parameters for one outline submission. Frozen once the job is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineJobRequest {
    pub knowledge_source_ids: Vec<KnowledgeSourceId>,
    pub audience_ids: Vec<AudienceId>,
    pub desired_outcome: String,
    pub additional_context: Option<String>,
}

/// Caller-facing error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The request is well-formed but not allowed in the current state.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<JobStoreError> for ServiceError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound(id) => ServiceError::NotFound(format!("job {id}")),
            JobStoreError::Validation(msg) => ServiceError::Validation(msg),
            JobStoreError::InvalidTransition { .. }
            | JobStoreError::RetriesExhausted { .. }
            | JobStoreError::ClaimLost(_)
            | JobStoreError::AlreadyExists(_) => ServiceError::Conflict(err.to_string()),
            JobStoreError::Storage(msg) => ServiceError::Storage(msg),
        }
    }
}

impl From<ContentStoreError> for ServiceError {
    fn from(err: ContentStoreError) -> Self {
        match err {
            ContentStoreError::NotFound { entity, id } => ServiceError::NotFound(format!("{entity} {id}")),
            ContentStoreError::Validation(msg) => ServiceError::Validation(msg),
            ContentStoreError::InvalidReview { .. } => ServiceError::Conflict(err.to_string()),
            ContentStoreError::Storage(msg) => ServiceError::Storage(msg),
        }
    }
}

impl From<CollaboratorError> for ServiceError {
    fn from(err: CollaboratorError) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

impl From<AiError> for ServiceError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::InvalidInput(msg) => ServiceError::Validation(msg),
            other => ServiceError::Provider(other.to_string()),
        }
    }
}

pub struct GenerationService {
    jobs: Arc<dyn JobStore>,
    content: Arc<dyn ContentStore>,
    catalog: Arc<dyn Catalog>,
    provider: Arc<dyn AiProvider>,
    cache: Arc<dyn CacheInvalidator>,
    max_retries: u32,
}

impl GenerationService {
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
            cache: Arc::new(NoopCacheInvalidator),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = cache;
        self
    }

    /// `max_retries` stamped on new jobs.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub async fn submit_outline_job(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        course_id: CourseId,
        request: OutlineJobRequest,
    ) -> Result<JobId, ServiceError> {
        if request.knowledge_source_ids.is_empty() {
            return Err(ServiceError::Validation(
                "at least one knowledge source is required".to_string(),
            ));
        }
        let desired_outcome = request.desired_outcome.trim();
        if desired_outcome.is_empty() {
            return Err(ServiceError::Validation("desired outcome is required".to_string()));
        }
        self.catalog
            .course(tenant_id, course_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("course {course_id}")))?;

        let input_id = GenerationInputId::new();
        self.content
            .save_generation_input(CourseGenerationInput {
                id: input_id,
                tenant_id,
                course_id,
                knowledge_source_ids: request.knowledge_source_ids,
                audience_ids: request.audience_ids,
                desired_outcome: desired_outcome.to_string(),
                additional_context: request
                    .additional_context
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty()),
                created_by: user_id,
                created_at: Utc::now(),
            })
            .await?;

        let job = GenerationJob::new_outline(tenant_id, user_id, course_id, input_id)
            .with_max_retries(self.max_retries);
        let job_id = self.jobs.create(job).await?;
        info!(job_id = %job_id, tenant_id = %tenant_id, course_id = %course_id, "outline job queued");
        Ok(job_id)
    }

    /// Queue lesson content generation. The course's latest outline must be
    /// approved and contain the lesson; otherwise no job row is created.
    pub async fn submit_lesson_job(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        course_id: CourseId,
        outline_lesson_id: OutlineLessonId,
    ) -> Result<JobId, ServiceError> {
        let lesson = self
            .content
            .get_outline_lesson(tenant_id, outline_lesson_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("outline lesson {outline_lesson_id}")))?;
        let outline = self
            .content
            .latest_outline(tenant_id, course_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("outline for course {course_id}")))?;

        if outline.approval_status != ApprovalStatus::Approved {
            return Err(ServiceError::Validation(format!(
                "outline v{} is {}; lesson content needs an approved outline",
                outline.version, outline.approval_status
            )));
        }
        if lesson.outline_id != outline.id {
            return Err(ServiceError::Validation(format!(
                "outline lesson {outline_lesson_id} is not part of the course's current outline"
            )));
        }

        let job = GenerationJob::new_lesson(tenant_id, user_id, course_id, outline_lesson_id)
            .with_max_retries(self.max_retries);
        let job_id = self.jobs.create(job).await?;
        info!(
            job_id = %job_id,
            tenant_id = %tenant_id,
            outline_lesson_id = %outline_lesson_id,
            "lesson job queued"
        );
        Ok(job_id)
    }

    pub async fn get_job(&self, tenant_id: TenantId, job_id: JobId) -> Result<GenerationJob, ServiceError> {
        self.jobs
            .get(tenant_id, job_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("job {job_id}")))
    }

    pub async fn list_jobs(
        &self,
        tenant_id: TenantId,
        filter: &JobFilter,
    ) -> Result<Vec<GenerationJob>, ServiceError> {
        Ok(self.jobs.list(tenant_id, filter).await?)
    }

    pub async fn cancel_job(&self, tenant_id: TenantId, job_id: JobId) -> Result<GenerationJob, ServiceError> {
        let job = self.jobs.cancel(tenant_id, job_id).await?;
        info!(job_id = %job_id, tenant_id = %tenant_id, "job cancelled");
        Ok(job)
    }

    pub async fn retry_job(&self, tenant_id: TenantId, job_id: JobId) -> Result<GenerationJob, ServiceError> {
        let job = self.jobs.retry(tenant_id, job_id).await?;
        info!(
            job_id = %job_id,
            tenant_id = %tenant_id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            "job re-queued"
        );
        Ok(job)
    }

    pub async fn job_stats(&self, tenant_id: TenantId) -> Result<JobStats, ServiceError> {
        Ok(self.jobs.stats(tenant_id).await?)
    }

    /// Latest outline version with its sections and lessons.
    pub async fn get_latest_outline(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<OutlineTree, ServiceError> {
        let outline = self
            .content
            .latest_outline(tenant_id, course_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("outline for course {course_id}")))?;
        let sections = self.content.list_sections(tenant_id, outline.id).await?;
        let lessons = self.content.list_outline_lessons(tenant_id, outline.id).await?;
        Ok(OutlineTree {
            outline,
            sections,
            lessons,
        })
    }

    /// Every outline version of a course, oldest first.
    pub async fn list_outline_versions(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Vec<CourseOutline>, ServiceError> {
        Ok(self.content.list_outlines(tenant_id, course_id).await?)
    }

    pub async fn review_outline(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
        decision: ApprovalStatus,
        reviewer: UserId,
    ) -> Result<CourseOutline, ServiceError> {
        let outline = self
            .content
            .review_outline(tenant_id, outline_id, decision, reviewer)
            .await?;
        info!(
            outline_id = %outline_id,
            tenant_id = %tenant_id,
            decision = %decision,
            "outline reviewed"
        );
        self.invalidate(tenant_id, outline.course_id).await;
        Ok(outline)
    }

    pub async fn get_generated_lesson(
        &self,
        tenant_id: TenantId,
        outline_lesson_id: OutlineLessonId,
    ) -> Result<LessonWithComponents, ServiceError> {
        self.content
            .get_generated_lesson(tenant_id, outline_lesson_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("generated lesson for {outline_lesson_id}")))
    }

    /// Rewrite one component in place with a synchronous provider call.
    pub async fn regenerate_component(
        &self,
        tenant_id: TenantId,
        component_id: ComponentId,
        instruction: &str,
    ) -> Result<LessonComponent, ServiceError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(ServiceError::Validation("instruction is required".to_string()));
        }

        let component = self
            .content
            .get_component(tenant_id, component_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("component {component_id}")))?;
        let lesson = self
            .content
            .get_lesson(tenant_id, component.lesson_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("lesson {}", component.lesson_id)))?;
        let outline_lesson = self
            .content
            .get_outline_lesson(tenant_id, lesson.outline_lesson_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("outline lesson {}", lesson.outline_lesson_id)))?;
        let course = self
            .catalog
            .course(tenant_id, lesson.course_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("course {}", lesson.course_id)))?;

        let outline = self
            .content
            .get_outline(tenant_id, outline_lesson.outline_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("outline {}", outline_lesson.outline_id)))?;
        let input =
            outline_input::<ServiceError>(&*self.jobs, &*self.content, tenant_id, &outline).await?;
        let audience = match input {
            Some(input) if !input.audience_ids.is_empty() => self
                .catalog
                .audiences(tenant_id, &input.audience_ids)
                .await?
                .into_iter()
                .map(|a| AudienceProfile {
                    name: a.name,
                    description: a.description,
                })
                .collect(),
            _ => Vec::new(),
        };

        let request = ComponentRegenerationRequest {
            component_type: component.component_type,
            current_content: component.content,
            instruction: instruction.to_string(),
            lesson: LessonContext {
                course_title: course.title,
                lesson_title: outline_lesson.title,
                lesson_description: outline_lesson.description,
            },
            audience,
        };
        let generated = self.provider.regenerate_component(&request).await?;

        let updated = self
            .content
            .update_component_content(tenant_id, component_id, generated.output)
            .await?;
        info!(
            component_id = %component_id,
            tenant_id = %tenant_id,
            tokens_used = generated.tokens_used,
            "component regenerated"
        );
        self.invalidate(tenant_id, lesson.course_id).await;
        Ok(updated)
    }

    async fn invalidate(&self, tenant_id: TenantId, course_id: CourseId) {
        if let Err(err) = self.cache.invalidate_course(tenant_id, course_id).await {
            warn!(course_id = %course_id, error = %err, "cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use courseforge_ai::testing::ScriptedProvider;
    use courseforge_core::ComponentType;
    use serde_json::json;

    use crate::collaborators::{InMemoryCacheInvalidator, InMemoryCatalog};
    use crate::content::{
        ComponentDraft, GeneratedLessonDraft, InMemoryContentStore, LessonDraft, OutlineDraft,
        SectionDraft,
    };
    use crate::generation::{JobOutcome, Orchestrator};
    use crate::jobs::{InMemoryJobStore, JobStatus};

    struct Fixture {
        service: GenerationService,
        jobs: Arc<InMemoryJobStore>,
        content: Arc<InMemoryContentStore>,
        catalog: Arc<InMemoryCatalog>,
        provider: Arc<ScriptedProvider>,
        cache: Arc<InMemoryCacheInvalidator>,
        tenant: TenantId,
        user: UserId,
        course: CourseId,
    }

    fn fixture() -> Fixture {
        let tenant = TenantId::new();
        let jobs = InMemoryJobStore::arc();
        let content = InMemoryContentStore::arc();
        let catalog = Arc::new(InMemoryCatalog::new());
        let provider = Arc::new(ScriptedProvider::new());
        let cache = Arc::new(InMemoryCacheInvalidator::new());
        let course = catalog.add_course(tenant, "Forklift basics");

        let service = GenerationService::new(
            jobs.clone(),
            content.clone(),
            catalog.clone(),
            provider.clone(),
        )
        .with_cache(cache.clone())
        .with_max_retries(2);

        Fixture {
            service,
            jobs,
            content,
            catalog,
            provider,
            cache,
            tenant,
            user: UserId::new(),
            course,
        }
    }

    fn outline_request(sources: Vec<KnowledgeSourceId>) -> OutlineJobRequest {
        OutlineJobRequest {
            knowledge_source_ids: sources,
            audience_ids: vec![],
            desired_outcome: " Operate safely ".to_string(),
            additional_context: Some("  ".to_string()),
        }
    }

    async fn outline(f: &Fixture) -> OutlineTree {
        let draft = OutlineDraft {
            sections: vec![SectionDraft {
                title: "Basics".to_string(),
                description: String::new(),
                lessons: vec![LessonDraft {
                    title: "Controls".to_string(),
                    description: "Levers and pedals".to_string(),
                    duration_minutes: 10,
                    objectives: vec![],
                }],
            }],
        };
        f.content
            .store_outline(f.tenant, f.course, None, &draft)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn outline_submission_freezes_input_and_queues() {
        let f = fixture();
        let source = f.catalog.add_knowledge_source(f.tenant, "Manual", "ops", vec![]);

        let id = f
            .service
            .submit_outline_job(f.tenant, f.user, f.course, outline_request(vec![source]))
            .await
            .unwrap();

        let job = f.service.get_job(f.tenant, id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.max_retries, 2);
        assert_eq!(job.requested_by, f.user);

        let input_id = job.generation_input_id.unwrap();
        let input = f
            .content
            .get_generation_input(f.tenant, input_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(input.desired_outcome, "Operate safely");
        assert_eq!(input.additional_context, None);
        assert_eq!(input.knowledge_source_ids, vec![source]);
    }

    #[tokio::test]
    async fn resubmission_does_not_touch_queued_job_inputs() {
        let f = fixture();
        let manual = f.catalog.add_knowledge_source(f.tenant, "Manual", "ops", vec![]);
        let wiki = f.catalog.add_knowledge_source(f.tenant, "Wiki", "ops", vec![]);

        let first = f
            .service
            .submit_outline_job(f.tenant, f.user, f.course, outline_request(vec![manual]))
            .await
            .unwrap();
        let second = f
            .service
            .submit_outline_job(f.tenant, f.user, f.course, outline_request(vec![wiki]))
            .await
            .unwrap();

        let first_job = f.service.get_job(f.tenant, first).await.unwrap();
        let second_job = f.service.get_job(f.tenant, second).await.unwrap();
        assert_ne!(first_job.generation_input_id, second_job.generation_input_id);

        let orchestrator = Orchestrator::new(
            f.jobs.clone(),
            f.content.clone(),
            f.catalog.clone(),
            f.provider.clone(),
        );
        let claimed = f
            .jobs
            .claim_next("worker-a", Utc::now() - chrono::Duration::minutes(10), None)
            .await
            .unwrap()
            .unwrap();
        let claimed_id = claimed.id;
        assert_eq!(orchestrator.process(claimed).await, JobOutcome::Completed);

        let expected = if claimed_id == first { "Manual" } else { "Wiki" };
        assert_eq!(f.provider.outline_requests()[0].knowledge[0].source_name, expected);
    }

    #[tokio::test]
    async fn outline_submission_validates_before_enqueue() {
        let f = fixture();

        let err = f
            .service
            .submit_outline_job(f.tenant, f.user, f.course, outline_request(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = f
            .service
            .submit_outline_job(
                f.tenant,
                f.user,
                CourseId::new(),
                outline_request(vec![KnowledgeSourceId::new()]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        assert_eq!(f.service.job_stats(f.tenant).await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn lesson_submission_requires_approved_outline() {
        let f = fixture();
        let tree = outline(&f).await;
        let lesson_id = tree.lessons[0].id;

        let err = f
            .service
            .submit_lesson_job(f.tenant, f.user, f.course, lesson_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(f.jobs.list(f.tenant, &JobFilter::default()).await.unwrap().is_empty());

        f.service
            .review_outline(f.tenant, tree.outline.id, ApprovalStatus::Approved, f.user)
            .await
            .unwrap();
        let id = f
            .service
            .submit_lesson_job(f.tenant, f.user, f.course, lesson_id)
            .await
            .unwrap();
        assert_eq!(f.service.get_job(f.tenant, id).await.unwrap().outline_lesson_id, Some(lesson_id));
    }

    #[tokio::test]
    async fn lesson_submission_rejects_lessons_from_older_outlines() {
        let f = fixture();
        let old = outline(&f).await;
        let current = outline(&f).await;
        f.service
            .review_outline(f.tenant, current.outline.id, ApprovalStatus::Approved, f.user)
            .await
            .unwrap();

        let err = f
            .service
            .submit_lesson_job(f.tenant, f.user, f.course, old.lessons[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn review_conflicts_and_invalidates_cache() {
        let f = fixture();
        let tree = outline(&f).await;

        let reviewed = f
            .service
            .review_outline(f.tenant, tree.outline.id, ApprovalStatus::Rejected, f.user)
            .await
            .unwrap();
        assert_eq!(reviewed.approval_status, ApprovalStatus::Rejected);
        assert_eq!(reviewed.reviewed_by, Some(f.user));
        assert_eq!(f.cache.invalidated(), vec![(f.tenant, f.course)]);

        let err = f
            .service
            .review_outline(f.tenant, tree.outline.id, ApprovalStatus::Approved, f.user)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn cancel_and_retry_follow_job_rules() {
        let f = fixture();
        let source = f.catalog.add_knowledge_source(f.tenant, "Manual", "ops", vec![]);
        let id = f
            .service
            .submit_outline_job(f.tenant, f.user, f.course, outline_request(vec![source]))
            .await
            .unwrap();

        let cancelled = f.service.cancel_job(f.tenant, id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        let err = f.service.cancel_job(f.tenant, id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        let err = f.service.retry_job(f.tenant, id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let err = f.service.get_job(TenantId::new(), id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn regenerate_component_rewrites_in_place() {
        let f = fixture();
        let tree = outline(&f).await;
        let stored = f
            .content
            .store_generated_lesson(
                f.tenant,
                &GeneratedLessonDraft {
                    course_id: f.course,
                    outline_lesson_id: tree.lessons[0].id,
                    generated_by: None,
                    segue: None,
                    components: vec![ComponentDraft {
                        component_type: ComponentType::Text,
                        content: json!({"text": "Pull the lever."}),
                    }],
                },
            )
            .await
            .unwrap();
        let component_id = stored.components[0].id;
        f.provider.push_component(Ok(json!({"text": "Gently pull the lever."})));

        let updated = f
            .service
            .regenerate_component(f.tenant, component_id, "make it gentler")
            .await
            .unwrap();
        assert_eq!(updated.content, json!({"text": "Gently pull the lever."}));

        let request = &f.provider.regeneration_requests()[0];
        assert_eq!(request.instruction, "make it gentler");
        assert_eq!(request.lesson.course_title, "Forklift basics");
        assert_eq!(request.lesson.lesson_title, "Controls");

        let err = f
            .service
            .regenerate_component(f.tenant, component_id, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(f.provider.calls().regenerate_component, 1);
    }

    #[tokio::test]
    async fn regenerate_component_surfaces_provider_errors() {
        let f = fixture();
        let tree = outline(&f).await;
        let stored = f
            .content
            .store_generated_lesson(
                f.tenant,
                &GeneratedLessonDraft {
                    course_id: f.course,
                    outline_lesson_id: tree.lessons[0].id,
                    generated_by: None,
                    segue: None,
                    components: vec![ComponentDraft {
                        component_type: ComponentType::Heading,
                        content: json!({"text": "Controls"}),
                    }],
                },
            )
            .await
            .unwrap();
        f.provider
            .push_component(Err(AiError::RateLimited { retry_after_ms: Some(500) }));

        let err = f
            .service
            .regenerate_component(f.tenant, stored.components[0].id, "shorter")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Provider(_)));

        let unchanged = f
            .content
            .get_component(f.tenant, stored.components[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.content, json!({"text": "Controls"}));
    }
}

//! Content storage contract and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;

use courseforge_core::{
    ApprovalStatus, ComponentId, CourseId, GenerationInputId, JobId, LessonId, OutlineId,
    OutlineLessonId, SectionId, TenantId, UserId,
};

use super::types::{
    CourseGenerationInput, CourseOutline, GeneratedLesson, GeneratedLessonDraft, LessonComponent,
    LessonWithComponents, OutlineDraft, OutlineLesson, OutlineSection, OutlineTree,
};

/// Durable artifacts of generation jobs.
///
/// Multi-row writes (`store_outline`, `store_generated_lesson`) are atomic:
/// readers see either none or all of the rows they write.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a new generation input. Inputs are never updated; an id that is
    /// already stored is rejected.
    async fn save_generation_input(&self, input: CourseGenerationInput) -> Result<(), ContentStoreError>;

    async fn get_generation_input(
        &self,
        tenant_id: TenantId,
        input_id: GenerationInputId,
    ) -> Result<Option<CourseGenerationInput>, ContentStoreError>;

    /// Most recently submitted input for the course.
    async fn latest_generation_input(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Option<CourseGenerationInput>, ContentStoreError>;

    /// Write a new `pending_review` outline version (`latest + 1`) with its tree.
    async fn store_outline(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
        generated_by: Option<JobId>,
        draft: &OutlineDraft,
    ) -> Result<OutlineTree, ContentStoreError>;

    /// Highest outline version for the course.
    async fn latest_outline(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Option<CourseOutline>, ContentStoreError>;

    async fn get_outline(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> Result<Option<CourseOutline>, ContentStoreError>;

    /// Every outline version of the course, oldest first.
    async fn list_outlines(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Vec<CourseOutline>, ContentStoreError>;

    async fn get_section(
        &self,
        tenant_id: TenantId,
        section_id: SectionId,
    ) -> Result<Option<OutlineSection>, ContentStoreError>;

    /// Ordered by position.
    async fn list_sections(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> Result<Vec<OutlineSection>, ContentStoreError>;

    /// In course order: section position, then lesson position.
    async fn list_outline_lessons(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> Result<Vec<OutlineLesson>, ContentStoreError>;

    async fn get_outline_lesson(
        &self,
        tenant_id: TenantId,
        outline_lesson_id: OutlineLessonId,
    ) -> Result<Option<OutlineLesson>, ContentStoreError>;

    /// Approve or reject a `pending_review` outline.
    async fn review_outline(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
        decision: ApprovalStatus,
        reviewer: UserId,
    ) -> Result<CourseOutline, ContentStoreError>;

    /// Write a lesson and its components, replacing any earlier lesson for the
    /// same outline lesson.
    async fn store_generated_lesson(
        &self,
        tenant_id: TenantId,
        draft: &GeneratedLessonDraft,
    ) -> Result<LessonWithComponents, ContentStoreError>;

    async fn get_generated_lesson(
        &self,
        tenant_id: TenantId,
        outline_lesson_id: OutlineLessonId,
    ) -> Result<Option<LessonWithComponents>, ContentStoreError>;

    /// Generated lesson headers for an outline, in course order. Outline
    /// lessons without content are skipped.
    async fn list_generated_lessons(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> Result<Vec<GeneratedLesson>, ContentStoreError>;

    /// Lesson header only, looked up by its own id.
    async fn get_lesson(
        &self,
        tenant_id: TenantId,
        lesson_id: LessonId,
    ) -> Result<Option<GeneratedLesson>, ContentStoreError>;

    async fn get_component(
        &self,
        tenant_id: TenantId,
        component_id: ComponentId,
    ) -> Result<Option<LessonComponent>, ContentStoreError>;

    async fn update_component_content(
        &self,
        tenant_id: TenantId,
        component_id: ComponentId,
        content: JsonValue,
    ) -> Result<LessonComponent, ContentStoreError>;
}

/// Content store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContentStoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid content: {0}")]
    Validation(String),
    #[error("outline {outline_id} is {from}, cannot move to {to}")]
    InvalidReview {
        outline_id: OutlineId,
        from: ApprovalStatus,
        to: ApprovalStatus,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

impl ContentStoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub(crate) fn validate_outline_draft(draft: &OutlineDraft) -> Result<(), ContentStoreError> {
    if draft.sections.is_empty() {
        return Err(ContentStoreError::Validation(
            "an outline needs at least one section".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_review(
    outline: &CourseOutline,
    decision: ApprovalStatus,
) -> Result<(), ContentStoreError> {
    if decision == ApprovalStatus::PendingReview
        || !outline.approval_status.can_transition_to(decision)
    {
        return Err(ContentStoreError::InvalidReview {
            outline_id: outline.id,
            from: outline.approval_status,
            to: decision,
        });
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Content {
    inputs: HashMap<GenerationInputId, CourseGenerationInput>,
    outlines: HashMap<OutlineId, CourseOutline>,
    sections: HashMap<OutlineId, Vec<OutlineSection>>,
    lessons: HashMap<OutlineId, Vec<OutlineLesson>>,
    generated: HashMap<OutlineLessonId, LessonWithComponents>,
}

impl Content {
    fn outline(&self, tenant_id: TenantId, outline_id: OutlineId) -> Option<&CourseOutline> {
        self.outlines.get(&outline_id).filter(|o| o.tenant_id == tenant_id)
    }

    fn component_mut(
        &mut self,
        tenant_id: TenantId,
        component_id: ComponentId,
    ) -> Option<&mut LessonComponent> {
        self.generated
            .values_mut()
            .filter(|l| l.lesson.tenant_id == tenant_id)
            .flat_map(|l| l.components.iter_mut())
            .find(|c| c.id == component_id)
    }
}

/// In-memory content store for tests/dev.
///
/// One lock over all tables keeps every multi-row write atomic.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    inner: RwLock<Content>,
}

fn poisoned<T>(_: T) -> ContentStoreError {
    ContentStoreError::Storage("content store lock poisoned".to_string())
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn save_generation_input(&self, input: CourseGenerationInput) -> Result<(), ContentStoreError> {
        let mut content = self.inner.write().map_err(poisoned)?;
        if content.inputs.contains_key(&input.id) {
            return Err(ContentStoreError::Validation(format!(
                "generation input {} already exists",
                input.id
            )));
        }
        content.inputs.insert(input.id, input);
        Ok(())
    }

    async fn get_generation_input(
        &self,
        tenant_id: TenantId,
        input_id: GenerationInputId,
    ) -> Result<Option<CourseGenerationInput>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        Ok(content
            .inputs
            .get(&input_id)
            .filter(|i| i.tenant_id == tenant_id)
            .cloned())
    }

    async fn latest_generation_input(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Option<CourseGenerationInput>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        Ok(content
            .inputs
            .values()
            .filter(|i| i.tenant_id == tenant_id && i.course_id == course_id)
            .max_by_key(|i| (i.created_at, i.id))
            .cloned())
    }

    async fn store_outline(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
        generated_by: Option<JobId>,
        draft: &OutlineDraft,
    ) -> Result<OutlineTree, ContentStoreError> {
        validate_outline_draft(draft)?;
        let mut content = self.inner.write().map_err(poisoned)?;

        let version = content
            .outlines
            .values()
            .filter(|o| o.tenant_id == tenant_id && o.course_id == course_id)
            .map(|o| o.version)
            .max()
            .unwrap_or(0)
            + 1;

        let outline = CourseOutline {
            id: OutlineId::new(),
            tenant_id,
            course_id,
            version,
            approval_status: ApprovalStatus::PendingReview,
            generated_by,
            created_at: Utc::now(),
            reviewed_by: None,
            reviewed_at: None,
        };
        let (sections, lessons) = draft.materialize(tenant_id, outline.id);

        content.outlines.insert(outline.id, outline.clone());
        content.sections.insert(outline.id, sections.clone());
        content.lessons.insert(outline.id, lessons.clone());

        Ok(OutlineTree {
            outline,
            sections,
            lessons,
        })
    }

    async fn latest_outline(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Option<CourseOutline>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        Ok(content
            .outlines
            .values()
            .filter(|o| o.tenant_id == tenant_id && o.course_id == course_id)
            .max_by_key(|o| o.version)
            .cloned())
    }

    async fn get_outline(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> Result<Option<CourseOutline>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        Ok(content.outline(tenant_id, outline_id).cloned())
    }

    async fn list_outlines(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Vec<CourseOutline>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        let mut outlines: Vec<CourseOutline> = content
            .outlines
            .values()
            .filter(|o| o.tenant_id == tenant_id && o.course_id == course_id)
            .cloned()
            .collect();
        outlines.sort_by_key(|o| o.version);
        Ok(outlines)
    }

    async fn get_section(
        &self,
        tenant_id: TenantId,
        section_id: SectionId,
    ) -> Result<Option<OutlineSection>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        Ok(content
            .sections
            .values()
            .flatten()
            .find(|s| s.id == section_id && s.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_sections(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> Result<Vec<OutlineSection>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        if content.outline(tenant_id, outline_id).is_none() {
            return Ok(vec![]);
        }
        Ok(content.sections.get(&outline_id).cloned().unwrap_or_default())
    }

    async fn list_outline_lessons(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> Result<Vec<OutlineLesson>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        if content.outline(tenant_id, outline_id).is_none() {
            return Ok(vec![]);
        }
        // Stored in course order by `materialize`.
        Ok(content.lessons.get(&outline_id).cloned().unwrap_or_default())
    }

    async fn get_outline_lesson(
        &self,
        tenant_id: TenantId,
        outline_lesson_id: OutlineLessonId,
    ) -> Result<Option<OutlineLesson>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        Ok(content
            .lessons
            .values()
            .flatten()
            .find(|l| l.id == outline_lesson_id && l.tenant_id == tenant_id)
            .cloned())
    }

    async fn review_outline(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
        decision: ApprovalStatus,
        reviewer: UserId,
    ) -> Result<CourseOutline, ContentStoreError> {
        let mut content = self.inner.write().map_err(poisoned)?;
        let outline = content
            .outlines
            .get_mut(&outline_id)
            .filter(|o| o.tenant_id == tenant_id)
            .ok_or_else(|| ContentStoreError::not_found("outline", outline_id))?;

        check_review(outline, decision)?;
        outline.approval_status = decision;
        outline.reviewed_by = Some(reviewer);
        outline.reviewed_at = Some(Utc::now());
        Ok(outline.clone())
    }

    async fn store_generated_lesson(
        &self,
        tenant_id: TenantId,
        draft: &GeneratedLessonDraft,
    ) -> Result<LessonWithComponents, ContentStoreError> {
        let mut content = self.inner.write().map_err(poisoned)?;
        let exists = content
            .lessons
            .values()
            .flatten()
            .any(|l| l.id == draft.outline_lesson_id && l.tenant_id == tenant_id);
        if !exists {
            return Err(ContentStoreError::not_found("outline lesson", draft.outline_lesson_id));
        }

        let lesson = draft.materialize(tenant_id);
        content.generated.insert(draft.outline_lesson_id, lesson.clone());
        Ok(lesson)
    }

    async fn get_generated_lesson(
        &self,
        tenant_id: TenantId,
        outline_lesson_id: OutlineLessonId,
    ) -> Result<Option<LessonWithComponents>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        Ok(content
            .generated
            .get(&outline_lesson_id)
            .filter(|l| l.lesson.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_generated_lessons(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> Result<Vec<GeneratedLesson>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        if content.outline(tenant_id, outline_id).is_none() {
            return Ok(vec![]);
        }
        Ok(content
            .lessons
            .get(&outline_id)
            .into_iter()
            .flatten()
            .filter_map(|l| content.generated.get(&l.id))
            .map(|g| g.lesson.clone())
            .collect())
    }

    async fn get_lesson(
        &self,
        tenant_id: TenantId,
        lesson_id: LessonId,
    ) -> Result<Option<GeneratedLesson>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        Ok(content
            .generated
            .values()
            .map(|l| &l.lesson)
            .find(|l| l.id == lesson_id && l.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_component(
        &self,
        tenant_id: TenantId,
        component_id: ComponentId,
    ) -> Result<Option<LessonComponent>, ContentStoreError> {
        let content = self.inner.read().map_err(poisoned)?;
        Ok(content
            .generated
            .values()
            .filter(|l| l.lesson.tenant_id == tenant_id)
            .flat_map(|l| l.components.iter())
            .find(|c| c.id == component_id)
            .cloned())
    }

    async fn update_component_content(
        &self,
        tenant_id: TenantId,
        component_id: ComponentId,
        new_content: JsonValue,
    ) -> Result<LessonComponent, ContentStoreError> {
        if new_content.is_null() {
            return Err(ContentStoreError::Validation(
                "component content must not be null".to_string(),
            ));
        }
        let mut content = self.inner.write().map_err(poisoned)?;
        let component = content
            .component_mut(tenant_id, component_id)
            .ok_or_else(|| ContentStoreError::not_found("component", component_id))?;
        component.content = new_content;
        component.updated_at = Utc::now();
        Ok(component.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::types::{ComponentDraft, LessonDraft, SectionDraft};
    use courseforge_core::ComponentType;
    use serde_json::json;

    fn draft() -> OutlineDraft {
        OutlineDraft {
            sections: vec![SectionDraft {
                title: "Basics".to_string(),
                description: String::new(),
                lessons: vec![
                    LessonDraft {
                        title: "One".to_string(),
                        description: String::new(),
                        duration_minutes: 5,
                        objectives: vec![],
                    },
                    LessonDraft {
                        title: "Two".to_string(),
                        description: String::new(),
                        duration_minutes: 5,
                        objectives: vec![],
                    },
                ],
            }],
        }
    }

    fn lesson_draft(course_id: CourseId, outline_lesson_id: OutlineLessonId, text: &str) -> GeneratedLessonDraft {
        GeneratedLessonDraft {
            course_id,
            outline_lesson_id,
            generated_by: None,
            segue: None,
            components: vec![ComponentDraft {
                component_type: ComponentType::Text,
                content: json!({"text": text}),
            }],
        }
    }

    #[tokio::test]
    async fn outline_versions_increase_and_latest_wins() {
        let store = InMemoryContentStore::new();
        let tenant = TenantId::new();
        let course = CourseId::new();

        let first = store.store_outline(tenant, course, None, &draft()).await.unwrap();
        let second = store.store_outline(tenant, course, None, &draft()).await.unwrap();
        assert_eq!(first.outline.version, 1);
        assert_eq!(second.outline.version, 2);
        assert_eq!(second.outline.approval_status, ApprovalStatus::PendingReview);

        let latest = store.latest_outline(tenant, course).await.unwrap().unwrap();
        assert_eq!(latest.id, second.outline.id);
        assert!(store.latest_outline(TenantId::new(), course).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_outline_is_rejected() {
        let store = InMemoryContentStore::new();
        let err = store
            .store_outline(TenantId::new(), CourseId::new(), None, &OutlineDraft::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ContentStoreError::Validation(_)));
    }

    #[tokio::test]
    async fn review_only_from_pending() {
        let store = InMemoryContentStore::new();
        let tenant = TenantId::new();
        let tree = store.store_outline(tenant, CourseId::new(), None, &draft()).await.unwrap();

        let approved = store
            .review_outline(tenant, tree.outline.id, ApprovalStatus::Approved, UserId::new())
            .await
            .unwrap();
        assert_eq!(approved.approval_status, ApprovalStatus::Approved);
        assert!(approved.reviewed_at.is_some());

        let err = store
            .review_outline(tenant, tree.outline.id, ApprovalStatus::Rejected, UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ContentStoreError::InvalidReview { .. }));

        let err = store
            .review_outline(TenantId::new(), tree.outline.id, ApprovalStatus::Approved, UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ContentStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn generated_lesson_is_replaced_per_outline_lesson() {
        let store = InMemoryContentStore::new();
        let tenant = TenantId::new();
        let course = CourseId::new();
        let tree = store.store_outline(tenant, course, None, &draft()).await.unwrap();
        let target = tree.lessons[0].id;

        let first = store
            .store_generated_lesson(tenant, &lesson_draft(course, target, "v1"))
            .await
            .unwrap();
        let second = store
            .store_generated_lesson(tenant, &lesson_draft(course, target, "v2"))
            .await
            .unwrap();
        assert_ne!(first.lesson.id, second.lesson.id);

        let stored = store.get_generated_lesson(tenant, target).await.unwrap().unwrap();
        assert_eq!(stored.lesson.id, second.lesson.id);
        assert_eq!(stored.components[0].content, json!({"text": "v2"}));
        assert!(store.get_component(tenant, first.components[0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn generated_lesson_requires_outline_lesson() {
        let store = InMemoryContentStore::new();
        let err = store
            .store_generated_lesson(
                TenantId::new(),
                &lesson_draft(CourseId::new(), OutlineLessonId::new(), "x"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ContentStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn component_content_update_is_tenant_scoped() {
        let store = InMemoryContentStore::new();
        let tenant = TenantId::new();
        let course = CourseId::new();
        let tree = store.store_outline(tenant, course, None, &draft()).await.unwrap();
        let lesson = store
            .store_generated_lesson(tenant, &lesson_draft(course, tree.lessons[1].id, "old"))
            .await
            .unwrap();
        let component_id = lesson.components[0].id;

        let err = store
            .update_component_content(TenantId::new(), component_id, json!({"text": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ContentStoreError::NotFound { .. }));

        let updated = store
            .update_component_content(tenant, component_id, json!({"text": "new"}))
            .await
            .unwrap();
        assert_eq!(updated.content, json!({"text": "new"}));
        assert_eq!(updated.position, 0);
    }

    fn input(tenant: TenantId, course: CourseId, outcome: &str) -> CourseGenerationInput {
        CourseGenerationInput {
            id: GenerationInputId::new(),
            tenant_id: tenant,
            course_id: course,
            knowledge_source_ids: vec![],
            audience_ids: vec![],
            desired_outcome: outcome.to_string(),
            additional_context: None,
            created_by: UserId::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn generation_inputs_are_append_only() {
        let store = InMemoryContentStore::new();
        let tenant = TenantId::new();
        let course = CourseId::new();
        let first = input(tenant, course, "first");
        let mut second = input(tenant, course, "second");
        second.created_at = first.created_at + chrono::Duration::seconds(1);

        store.save_generation_input(first.clone()).await.unwrap();
        store.save_generation_input(second.clone()).await.unwrap();

        let err = store
            .save_generation_input(CourseGenerationInput {
                desired_outcome: "rewritten".to_string(),
                ..first.clone()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ContentStoreError::Validation(_)));

        let stored = store.get_generation_input(tenant, first.id).await.unwrap().unwrap();
        assert_eq!(stored.desired_outcome, "first");
        let latest = store.latest_generation_input(tenant, course).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert!(store.get_generation_input(TenantId::new(), first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lists_outline_versions_sections_and_generated_lessons() {
        let store = InMemoryContentStore::new();
        let tenant = TenantId::new();
        let course = CourseId::new();
        let first = store.store_outline(tenant, course, None, &draft()).await.unwrap();
        let second = store.store_outline(tenant, course, None, &draft()).await.unwrap();

        let versions: Vec<u32> = store
            .list_outlines(tenant, course)
            .await
            .unwrap()
            .iter()
            .map(|o| o.version)
            .collect();
        assert_eq!(versions, vec![1, 2]);
        assert!(store.list_outlines(TenantId::new(), course).await.unwrap().is_empty());

        let section = store
            .get_section(tenant, second.sections[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(section.outline_id, second.outline.id);
        assert!(store.get_section(TenantId::new(), section.id).await.unwrap().is_none());

        // Stored out of course order; listed in course order.
        let two = store
            .store_generated_lesson(tenant, &lesson_draft(course, second.lessons[1].id, "two"))
            .await
            .unwrap();
        let one = store
            .store_generated_lesson(tenant, &lesson_draft(course, second.lessons[0].id, "one"))
            .await
            .unwrap();
        let listed: Vec<LessonId> = store
            .list_generated_lessons(tenant, second.outline.id)
            .await
            .unwrap()
            .iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(listed, vec![one.lesson.id, two.lesson.id]);
        assert!(store
            .list_generated_lessons(tenant, first.outline.id)
            .await
            .unwrap()
            .is_empty());
    }
}

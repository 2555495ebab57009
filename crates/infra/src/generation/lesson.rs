//! Lesson jobs: context → content → store.

use courseforge_ai::{LessonContentRequest, NeighboringLessons};
use courseforge_core::{ApprovalStatus, OutlineLessonId};

use crate::content::{ComponentDraft, GeneratedLessonDraft, OutlineLesson};
use crate::jobs::{GenerationJob, JobStage};

use super::error::GenerationError;
use super::inputs::outline_input;
use super::orchestrator::Orchestrator;

impl Orchestrator {
    pub(super) async fn run_lesson(&self, job: &mut GenerationJob) -> Result<String, GenerationError> {
        let tenant_id = job.tenant_id;
        let outline_lesson_id = job.outline_lesson_id.ok_or_else(|| {
            GenerationError::Validation("lesson job has no outline lesson id".to_string())
        })?;

        self.checkpoint(job, JobStage::LoadingContext).await?;
        let lesson = self
            .content
            .get_outline_lesson(tenant_id, outline_lesson_id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(format!("outline lesson {outline_lesson_id}")))?;
        let outline = self
            .content
            .get_outline(tenant_id, lesson.outline_id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(format!("outline {}", lesson.outline_id)))?;
        if job.course_id.is_some_and(|c| c != outline.course_id) {
            return Err(GenerationError::Validation(format!(
                "outline lesson {outline_lesson_id} does not belong to the job's course"
            )));
        }
        // Re-checked here: the outline may have been rejected after submission.
        if outline.approval_status != ApprovalStatus::Approved {
            return Err(GenerationError::Validation(format!(
                "outline {} is {}; lesson content needs an approved outline",
                outline.id, outline.approval_status
            )));
        }

        let section = self
            .content
            .get_section(tenant_id, lesson.section_id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(format!("outline section {}", lesson.section_id)))?;
        let course_lessons = self.content.list_outline_lessons(tenant_id, outline.id).await?;
        let course = self
            .catalog
            .course(tenant_id, outline.course_id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(format!("course {}", outline.course_id)))?;

        let input =
            outline_input::<GenerationError>(&*self.jobs, &*self.content, tenant_id, &outline).await?;
        let (knowledge, audience) = match &input {
            Some(input) => (
                self.knowledge(tenant_id, &input.knowledge_source_ids).await?,
                self.audience(tenant_id, &input.audience_ids).await?,
            ),
            None => (Vec::new(), Vec::new()),
        };

        self.checkpoint(job, JobStage::Generating).await?;
        let request = LessonContentRequest {
            course_title: course.title,
            section_title: section.title.clone(),
            lesson_title: lesson.title.clone(),
            description: lesson.description.clone(),
            objectives: lesson.objectives.clone(),
            knowledge,
            audience,
            is_last_in_section: lesson.is_last_in_section,
            is_last_in_course: lesson.is_last_in_course,
            neighbors: neighbors(&course_lessons, outline_lesson_id),
        };
        let generated = self.provider.generate_lesson_content(&request).await?;
        job.add_tokens(generated.tokens_used);

        self.checkpoint(job, JobStage::Storing).await?;
        let content = generated.output;
        let draft = GeneratedLessonDraft {
            course_id: outline.course_id,
            outline_lesson_id,
            generated_by: Some(job.id),
            segue: content.segue.filter(|s| !s.trim().is_empty()),
            components: content
                .components
                .into_iter()
                .map(|c| ComponentDraft {
                    component_type: c.component_type,
                    content: c.content,
                })
                .collect(),
        };
        let stored = self
            .content
            .store_generated_lesson(tenant_id, &draft)
            .await
            .map_err(GenerationError::results_not_saved)?;

        Ok(format!(
            "Lesson '{}' generated with {} component(s)",
            lesson.title,
            stored.components.len()
        ))
    }
}

/// Titles before and after `id` in course order.
fn neighbors(lessons: &[OutlineLesson], id: OutlineLessonId) -> NeighboringLessons {
    let Some(idx) = lessons.iter().position(|l| l.id == id) else {
        return NeighboringLessons::default();
    };
    NeighboringLessons {
        previous: idx
            .checked_sub(1)
            .and_then(|i| lessons.get(i))
            .map(|l| l.title.clone()),
        next: lessons.get(idx + 1).map(|l| l.title.clone()),
    }
}

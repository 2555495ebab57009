//! Outline jobs: knowledge → audience → skeleton + per-section expansion → store.

use tracing::warn;

use courseforge_ai::{ExpandedSection, OutlineRequest, SectionExpansionRequest, SectionSkeleton};

use crate::content::{LessonDraft, OutlineDraft, SectionDraft};
use crate::jobs::{GenerationJob, JobStage};

use super::error::GenerationError;
use super::orchestrator::Orchestrator;

impl Orchestrator {
    pub(super) async fn run_outline(&self, job: &mut GenerationJob) -> Result<String, GenerationError> {
        let tenant_id = job.tenant_id;
        let course_id = job
            .course_id
            .ok_or_else(|| GenerationError::Validation("outline job has no course id".to_string()))?;

        let input_id = job.generation_input_id.ok_or_else(|| {
            GenerationError::Validation("outline job has no generation input".to_string())
        })?;

        self.checkpoint(job, JobStage::GatheringKnowledge).await?;
        let input = self
            .content
            .get_generation_input(tenant_id, input_id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(format!("generation input {input_id}")))?;
        let course = self
            .catalog
            .course(tenant_id, course_id)
            .await?
            .ok_or_else(|| GenerationError::NotFound(format!("course {course_id}")))?;
        let knowledge = self.knowledge(tenant_id, &input.knowledge_source_ids).await?;
        if knowledge.is_empty() {
            return Err(GenerationError::Validation(format!(
                "none of the {} knowledge source(s) for course {course_id} could be resolved",
                input.knowledge_source_ids.len()
            )));
        }

        self.checkpoint(job, JobStage::AnalyzingAudience).await?;
        let audience = self.audience(tenant_id, &input.audience_ids).await?;

        self.checkpoint(job, JobStage::Generating).await?;
        let request = OutlineRequest {
            course_title: course.title.clone(),
            desired_outcome: input.desired_outcome.clone(),
            knowledge: knowledge.clone(),
            audience: audience.clone(),
            additional_context: input.additional_context.clone(),
        };
        let skeleton = self.provider.generate_outline_skeleton(&request).await?;
        job.add_tokens(skeleton.tokens_used);
        self.heartbeat(job).await?;

        let mut draft = OutlineDraft::default();
        let mut skipped = Vec::new();
        for section in &skeleton.output.sections {
            let expansion = SectionExpansionRequest {
                course_title: course.title.clone(),
                desired_outcome: input.desired_outcome.clone(),
                section_title: section.title.clone(),
                section_description: section.description.clone(),
                lesson_titles: section.lesson_titles.clone(),
                knowledge: knowledge.clone(),
                audience: audience.clone(),
                additional_context: input.additional_context.clone(),
            };

            match self.provider.expand_section(&expansion).await {
                Ok(expanded) => {
                    job.add_tokens(expanded.tokens_used);
                    draft.sections.push(section_draft(section, expanded.output));
                }
                Err(err) => {
                    warn!(
                        job_id = %job.id,
                        section = %section.title,
                        error = %err,
                        "section expansion failed, skipping section"
                    );
                    skipped.push(section.title.clone());
                }
            }
            self.heartbeat(job).await?;
        }

        if draft.sections.is_empty() {
            return Err(GenerationError::Provider(format!(
                "every section expansion failed ({} section(s))",
                skipped.len()
            )));
        }

        self.checkpoint(job, JobStage::Storing).await?;
        let tree = self
            .content
            .store_outline(tenant_id, course_id, Some(job.id), &draft)
            .await
            .map_err(GenerationError::results_not_saved)?;

        let mut summary = format!(
            "Outline v{} generated: {} section(s), {} lesson(s)",
            tree.outline.version,
            tree.sections.len(),
            tree.lessons.len()
        );
        if !skipped.is_empty() {
            summary.push_str(&format!("; skipped section(s): {}", skipped.join(", ")));
        }
        Ok(summary)
    }
}

/// Merge a skeleton section with its expanded lesson details.
fn section_draft(skeleton: &SectionSkeleton, expanded: ExpandedSection) -> SectionDraft {
    SectionDraft {
        title: skeleton.title.trim().to_string(),
        description: skeleton.description.trim().to_string(),
        lessons: expanded
            .lessons
            .into_iter()
            .map(|lesson| LessonDraft {
                title: lesson.title.trim().to_string(),
                description: lesson.description,
                duration_minutes: lesson.duration_minutes,
                objectives: lesson.objectives,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courseforge_ai::LessonDetail;

    #[test]
    fn section_draft_keeps_expanded_lessons_in_order() {
        let skeleton = SectionSkeleton {
            title: " Basics ".to_string(),
            description: "Intro".to_string(),
            lesson_titles: vec!["A".to_string(), "B".to_string()],
        };
        let expanded = ExpandedSection {
            lessons: vec![
                LessonDetail {
                    title: "A".to_string(),
                    description: "first".to_string(),
                    duration_minutes: 10,
                    objectives: vec!["know A".to_string()],
                },
                LessonDetail {
                    title: " B".to_string(),
                    description: "second".to_string(),
                    duration_minutes: 20,
                    objectives: vec![],
                },
            ],
        };

        let draft = section_draft(&skeleton, expanded);
        assert_eq!(draft.title, "Basics");
        assert_eq!(draft.lessons.len(), 2);
        assert_eq!(draft.lessons[1].title, "B");
        assert_eq!(draft.lessons[0].objectives, vec!["know A".to_string()]);
    }
}

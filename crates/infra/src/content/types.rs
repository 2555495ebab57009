//! Artifacts produced by generation jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use courseforge_core::{
    ApprovalStatus, AudienceId, ComponentId, ComponentType, CourseId, GenerationInputId, JobId,
    KnowledgeSourceId, LessonId, OutlineId, OutlineLessonId, SectionId, TenantId, UserId,
};

/// Frozen parameters for one outline submission.
///
/// Written once when an outline job is submitted and never updated. The job
/// row carries the id, so queued and retried runs read exactly what was
/// submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseGenerationInput {
    pub id: GenerationInputId,
    pub tenant_id: TenantId,
    pub course_id: CourseId,
    pub knowledge_source_ids: Vec<KnowledgeSourceId>,
    pub audience_ids: Vec<AudienceId>,
    pub desired_outcome: String,
    pub additional_context: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// One version of a course outline. The highest version is the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseOutline {
    pub id: OutlineId,
    pub tenant_id: TenantId,
    pub course_id: CourseId,
    pub version: u32,
    pub approval_status: ApprovalStatus,
    pub generated_by: Option<JobId>,
    pub created_at: DateTime<Utc>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub id: SectionId,
    pub tenant_id: TenantId,
    pub outline_id: OutlineId,
    pub position: u32,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineLesson {
    pub id: OutlineLessonId,
    pub tenant_id: TenantId,
    pub outline_id: OutlineId,
    pub section_id: SectionId,
    /// Position within the section.
    pub position: u32,
    pub title: String,
    pub description: String,
    pub duration_minutes: u32,
    pub objectives: Vec<String>,
    pub is_last_in_section: bool,
    pub is_last_in_course: bool,
}

/// An outline with its sections and lessons, both in course order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineTree {
    pub outline: CourseOutline,
    pub sections: Vec<OutlineSection>,
    pub lessons: Vec<OutlineLesson>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonDraft {
    pub title: String,
    pub description: String,
    pub duration_minutes: u32,
    pub objectives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDraft {
    pub title: String,
    pub description: String,
    pub lessons: Vec<LessonDraft>,
}

/// Outline content before ids, positions and flags are assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineDraft {
    pub sections: Vec<SectionDraft>,
}

impl OutlineDraft {
    pub fn lesson_count(&self) -> usize {
        self.sections.iter().map(|s| s.lessons.len()).sum()
    }

    /// Assign ids and positions, and flag the last lesson of every section and
    /// of the whole course.
    pub fn materialize(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> (Vec<OutlineSection>, Vec<OutlineLesson>) {
        let last_section_with_lessons = self.sections.iter().rposition(|s| !s.lessons.is_empty());

        let mut sections = Vec::with_capacity(self.sections.len());
        let mut lessons = Vec::with_capacity(self.lesson_count());

        for (s_idx, section) in self.sections.iter().enumerate() {
            let section_id = SectionId::new();
            sections.push(OutlineSection {
                id: section_id,
                tenant_id,
                outline_id,
                position: position(s_idx),
                title: section.title.clone(),
                description: section.description.clone(),
            });

            let last_in_section = section.lessons.len().checked_sub(1);
            for (l_idx, lesson) in section.lessons.iter().enumerate() {
                let is_last_in_section = Some(l_idx) == last_in_section;
                lessons.push(OutlineLesson {
                    id: OutlineLessonId::new(),
                    tenant_id,
                    outline_id,
                    section_id,
                    position: position(l_idx),
                    title: lesson.title.clone(),
                    description: lesson.description.clone(),
                    duration_minutes: lesson.duration_minutes,
                    objectives: lesson.objectives.clone(),
                    is_last_in_section,
                    is_last_in_course: is_last_in_section
                        && Some(s_idx) == last_section_with_lessons,
                });
            }
        }

        (sections, lessons)
    }
}

fn position(idx: usize) -> u32 {
    u32::try_from(idx).unwrap_or(u32::MAX)
}

/// Generated content for one outline lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedLesson {
    pub id: LessonId,
    pub tenant_id: TenantId,
    pub course_id: CourseId,
    pub outline_lesson_id: OutlineLessonId,
    pub segue: Option<String>,
    pub generated_by: Option<JobId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonComponent {
    pub id: ComponentId,
    pub tenant_id: TenantId,
    pub lesson_id: LessonId,
    pub position: u32,
    pub component_type: ComponentType,
    /// Opaque structured payload; shape depends on `component_type`.
    pub content: JsonValue,
    pub updated_at: DateTime<Utc>,
}

/// A lesson with its components ordered by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonWithComponents {
    pub lesson: GeneratedLesson,
    pub components: Vec<LessonComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDraft {
    pub component_type: ComponentType,
    pub content: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedLessonDraft {
    pub course_id: CourseId,
    pub outline_lesson_id: OutlineLessonId,
    pub generated_by: Option<JobId>,
    pub segue: Option<String>,
    pub components: Vec<ComponentDraft>,
}

impl GeneratedLessonDraft {
    pub fn materialize(&self, tenant_id: TenantId) -> LessonWithComponents {
        let now = Utc::now();
        let lesson = GeneratedLesson {
            id: LessonId::new(),
            tenant_id,
            course_id: self.course_id,
            outline_lesson_id: self.outline_lesson_id,
            segue: self.segue.clone(),
            generated_by: self.generated_by,
            created_at: now,
        };
        let components = self
            .components
            .iter()
            .enumerate()
            .map(|(idx, c)| LessonComponent {
                id: ComponentId::new(),
                tenant_id,
                lesson_id: lesson.id,
                position: position(idx),
                component_type: c.component_type,
                content: c.content.clone(),
                updated_at: now,
            })
            .collect();

        LessonWithComponents { lesson, components }
    }
}

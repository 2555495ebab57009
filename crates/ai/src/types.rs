//! Request and response shapes of the provider port.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use courseforge_core::ComponentType;

use crate::result::AiError;

/// Bounded, pre-processed excerpt of one knowledge source.
///
/// Built through [`crate::KnowledgeBudget`], never by hand in production code, so
/// every request inlines a predictable amount of source material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeDigest {
    pub source_name: String,
    pub domain: String,
    pub summary: Option<String>,
    pub excerpts: Vec<String>,
}

/// A target audience the course is written for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceProfile {
    pub name: String,
    pub description: Option<String>,
}

impl AudienceProfile {
    /// Render a list of audiences as the single `targetAudience` prompt field.
    pub fn describe_all(audiences: &[AudienceProfile]) -> String {
        if audiences.is_empty() {
            return "General audience".to_string();
        }

        audiences
            .iter()
            .map(|a| match &a.description {
                Some(d) if !d.trim().is_empty() => format!("{}: {}", a.name, d.trim()),
                _ => a.name.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// First outline call: sections with lesson titles only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineRequest {
    pub course_title: String,
    pub desired_outcome: String,
    pub knowledge: Vec<KnowledgeDigest>,
    pub audience: Vec<AudienceProfile>,
    pub additional_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSkeleton {
    pub sections: Vec<SectionSkeleton>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSkeleton {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub lesson_titles: Vec<String>,
}

impl OutlineSkeleton {
    /// Structural checks on provider output (not on content quality).
    pub fn validate(&self) -> Result<(), AiError> {
        if self.sections.is_empty() {
            return Err(AiError::malformed("outline has no sections"));
        }
        for (idx, section) in self.sections.iter().enumerate() {
            if section.title.trim().is_empty() {
                return Err(AiError::malformed(format!("section {idx} has an empty title")));
            }
            if section.lesson_titles.is_empty() {
                return Err(AiError::malformed(format!(
                    "section '{}' has no lesson titles",
                    section.title
                )));
            }
        }
        Ok(())
    }
}

/// Second outline call, one per section: expand lesson titles into full detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionExpansionRequest {
    pub course_title: String,
    pub desired_outcome: String,
    pub section_title: String,
    pub section_description: String,
    pub lesson_titles: Vec<String>,
    pub knowledge: Vec<KnowledgeDigest>,
    pub audience: Vec<AudienceProfile>,
    pub additional_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedSection {
    pub lessons: Vec<LessonDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonDetail {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub objectives: Vec<String>,
}

impl ExpandedSection {
    pub fn validate(&self) -> Result<(), AiError> {
        if self.lessons.is_empty() {
            return Err(AiError::malformed("section expansion returned no lessons"));
        }
        if let Some(idx) = self.lessons.iter().position(|l| l.title.trim().is_empty()) {
            return Err(AiError::malformed(format!("lesson {idx} has an empty title")));
        }
        Ok(())
    }
}

/// Titles of the lessons around the one being written, in course order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighboringLessons {
    pub previous: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonContentRequest {
    pub course_title: String,
    pub section_title: String,
    pub lesson_title: String,
    pub description: String,
    pub objectives: Vec<String>,
    pub knowledge: Vec<KnowledgeDigest>,
    pub audience: Vec<AudienceProfile>,
    pub is_last_in_section: bool,
    pub is_last_in_course: bool,
    pub neighbors: NeighboringLessons,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedComponent {
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub content: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonContent {
    pub components: Vec<GeneratedComponent>,
    #[serde(default)]
    pub segue: Option<String>,
}

impl LessonContent {
    pub fn validate(&self) -> Result<(), AiError> {
        if self.components.is_empty() {
            return Err(AiError::malformed("lesson has no components"));
        }
        if let Some(idx) = self.components.iter().position(|c| c.content.is_null()) {
            return Err(AiError::malformed(format!("component {idx} has no content")));
        }
        Ok(())
    }
}

/// Where a component lives, so the provider can keep its tone consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonContext {
    pub course_title: String,
    pub lesson_title: String,
    pub lesson_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRegenerationRequest {
    pub component_type: ComponentType,
    pub current_content: JsonValue,
    pub instruction: String,
    pub lesson: LessonContext,
    pub audience: Vec<AudienceProfile>,
}

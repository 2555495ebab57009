//! Prompt text and response schemas for the HTTP provider.
//!
//! Schemas are kept flat on purpose: the deepest one (outline skeleton) nests
//! section → lesson title and nothing further.

use std::fmt::Write as _;

use serde_json::{json, Value as JsonValue};

use crate::types::{
    AudienceProfile, ComponentRegenerationRequest, KnowledgeDigest, LessonContentRequest,
    OutlineRequest, SectionExpansionRequest,
};

pub const SYSTEM_PROMPT: &str = "You are an instructional designer. You write clear, accurate \
course material grounded only in the knowledge excerpts you are given. Always answer with JSON \
matching the requested schema and nothing else.";

/// A rendered prompt plus the schema the answer must follow.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub schema_name: &'static str,
    pub schema: JsonValue,
    pub user: String,
}

pub fn outline_skeleton(request: &OutlineRequest) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(user, "Design the section structure of the course \"{}\".", request.course_title);
    let _ = writeln!(user, "Desired outcome: {}", request.desired_outcome);
    let _ = writeln!(user, "Target audience: {}", AudienceProfile::describe_all(&request.audience));
    push_context(&mut user, request.additional_context.as_deref());
    push_knowledge(&mut user, &request.knowledge);
    let _ = writeln!(
        user,
        "\nReturn the sections in teaching order. For each section give a title, a one \
         sentence description and the titles of its lessons (titles only)."
    );

    Prompt {
        schema_name: "outline_skeleton",
        schema: json!({
            "type": "object",
            "properties": {
                "sections": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "description": {"type": "string"},
                            "lesson_titles": {"type": "array", "items": {"type": "string"}}
                        },
                        "required": ["title", "description", "lesson_titles"]
                    }
                }
            },
            "required": ["sections"]
        }),
        user,
    }
}

pub fn section_expansion(request: &SectionExpansionRequest) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(
        user,
        "Expand the section \"{}\" of the course \"{}\".",
        request.section_title, request.course_title
    );
    if !request.section_description.is_empty() {
        let _ = writeln!(user, "Section description: {}", request.section_description);
    }
    let _ = writeln!(user, "Desired outcome: {}", request.desired_outcome);
    let _ = writeln!(user, "Target audience: {}", AudienceProfile::describe_all(&request.audience));
    push_context(&mut user, request.additional_context.as_deref());
    let _ = writeln!(user, "\nLessons, in order:");
    for (idx, title) in request.lesson_titles.iter().enumerate() {
        let _ = writeln!(user, "{}. {}", idx + 1, title);
    }
    push_knowledge(&mut user, &request.knowledge);
    let _ = writeln!(
        user,
        "\nFor every lesson keep its title and order, and give a short description, an \
         estimated duration in minutes and 2 to 5 learning objectives."
    );

    Prompt {
        schema_name: "section_lessons",
        schema: json!({
            "type": "object",
            "properties": {
                "lessons": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "description": {"type": "string"},
                            "duration_minutes": {"type": "integer"},
                            "objectives": {"type": "array", "items": {"type": "string"}}
                        },
                        "required": ["title", "description", "duration_minutes", "objectives"]
                    }
                }
            },
            "required": ["lessons"]
        }),
        user,
    }
}

pub fn lesson_content(request: &LessonContentRequest) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(
        user,
        "Write the lesson \"{}\" in the section \"{}\" of the course \"{}\".",
        request.lesson_title, request.section_title, request.course_title
    );
    if !request.description.is_empty() {
        let _ = writeln!(user, "Lesson description: {}", request.description);
    }
    let _ = writeln!(user, "Target audience: {}", AudienceProfile::describe_all(&request.audience));
    if !request.objectives.is_empty() {
        let _ = writeln!(user, "Learning objectives:");
        for objective in &request.objectives {
            let _ = writeln!(user, "- {objective}");
        }
    }
    if let Some(prev) = &request.neighbors.previous {
        let _ = writeln!(user, "Previous lesson: {prev}");
    }
    if let Some(next) = &request.neighbors.next {
        let _ = writeln!(user, "Next lesson: {next}");
    }
    push_knowledge(&mut user, &request.knowledge);

    let segue = if request.is_last_in_course {
        "This is the final lesson of the course: end with a short closing summary as the segue."
    } else if request.is_last_in_section {
        "This is the last lesson of its section: the segue should bridge into the next section."
    } else {
        "The segue should lead naturally into the next lesson."
    };
    let _ = writeln!(
        user,
        "\nCompose the lesson from components of type text, heading, image or quiz. \
         Put each component's payload in `content`. {segue}"
    );

    Prompt {
        schema_name: "lesson_content",
        schema: json!({
            "type": "object",
            "properties": {
                "components": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "type": {"type": "string", "enum": ["text", "heading", "image", "quiz"]},
                            "content": {"type": "object"}
                        },
                        "required": ["type", "content"]
                    }
                },
                "segue": {"type": "string"}
            },
            "required": ["components", "segue"]
        }),
        user,
    }
}

pub fn component_regeneration(request: &ComponentRegenerationRequest) -> Prompt {
    let mut user = String::new();
    let _ = writeln!(
        user,
        "Rewrite one {} component of the lesson \"{}\" in the course \"{}\".",
        request.component_type, request.lesson.lesson_title, request.lesson.course_title
    );
    if !request.lesson.lesson_description.is_empty() {
        let _ = writeln!(user, "Lesson description: {}", request.lesson.lesson_description);
    }
    let _ = writeln!(user, "Target audience: {}", AudienceProfile::describe_all(&request.audience));
    let _ = writeln!(user, "Instruction: {}", request.instruction);
    let _ = writeln!(user, "Current content:\n{}", request.current_content);
    let _ = writeln!(user, "\nReturn the new payload in `content`, keeping the same shape.");

    Prompt {
        schema_name: "component",
        schema: json!({
            "type": "object",
            "properties": {"content": {"type": "object"}},
            "required": ["content"]
        }),
        user,
    }
}

fn push_context(out: &mut String, context: Option<&str>) {
    if let Some(ctx) = context.map(str::trim).filter(|c| !c.is_empty()) {
        let _ = writeln!(out, "Additional context: {ctx}");
    }
}

fn push_knowledge(out: &mut String, knowledge: &[KnowledgeDigest]) {
    if knowledge.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nKnowledge sources:");
    for digest in knowledge {
        let _ = writeln!(out, "## {} ({})", digest.source_name, digest.domain);
        if let Some(summary) = &digest.summary {
            let _ = writeln!(out, "Summary: {summary}");
        }
        for excerpt in &digest.excerpts {
            let _ = writeln!(out, "> {excerpt}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NeighboringLessons;

    fn digest() -> KnowledgeDigest {
        KnowledgeDigest {
            source_name: "Safety manual".to_string(),
            domain: "operations".to_string(),
            summary: Some("How we work safely".to_string()),
            excerpts: vec!["Wear gloves.".to_string()],
        }
    }

    #[test]
    fn outline_prompt_inlines_knowledge_and_context() {
        let prompt = outline_skeleton(&OutlineRequest {
            course_title: "Warehouse safety".to_string(),
            desired_outcome: "No incidents".to_string(),
            knowledge: vec![digest()],
            audience: vec![],
            additional_context: Some("  night shift  ".to_string()),
        });

        assert_eq!(prompt.schema_name, "outline_skeleton");
        assert!(prompt.user.contains("## Safety manual (operations)"));
        assert!(prompt.user.contains("> Wear gloves."));
        assert!(prompt.user.contains("Additional context: night shift"));
        assert!(prompt.user.contains("Target audience: General audience"));
    }

    #[test]
    fn lesson_prompt_mentions_course_end() {
        let prompt = lesson_content(&LessonContentRequest {
            course_title: "C".to_string(),
            section_title: "S".to_string(),
            lesson_title: "L".to_string(),
            description: String::new(),
            objectives: vec!["Know things".to_string()],
            knowledge: vec![],
            audience: vec![],
            is_last_in_section: true,
            is_last_in_course: true,
            neighbors: NeighboringLessons {
                previous: Some("Before".to_string()),
                next: None,
            },
        });

        assert!(prompt.user.contains("final lesson of the course"));
        assert!(prompt.user.contains("Previous lesson: Before"));
        assert!(!prompt.user.contains("Next lesson"));
    }
}

//! Scripted provider for tests.
//!
//! Each operation pops its next scripted result; once a queue is empty the
//! operation falls back to a small deterministic default. Every call is counted
//! and the last request of each kind is kept for assertions.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use courseforge_core::ComponentType;

use crate::provider::{AiProvider, Generated};
use crate::result::AiError;
use crate::types::{
    ComponentRegenerationRequest, ExpandedSection, GeneratedComponent, LessonContent,
    LessonContentRequest, LessonDetail, OutlineRequest, OutlineSkeleton, SectionExpansionRequest,
    SectionSkeleton,
};

/// Tokens reported by every default response.
pub const DEFAULT_TOKENS: u64 = 10;

type Script<T> = Mutex<VecDeque<Result<Generated<T>, AiError>>>;

/// Invocation counters per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCalls {
    pub outline_skeleton: usize,
    pub expand_section: usize,
    pub lesson_content: usize,
    pub regenerate_component: usize,
}

impl ProviderCalls {
    pub fn total(&self) -> usize {
        self.outline_skeleton + self.expand_section + self.lesson_content + self.regenerate_component
    }
}

#[derive(Debug, Default)]
struct Recorded {
    calls: ProviderCalls,
    outline_requests: Vec<OutlineRequest>,
    section_requests: Vec<SectionExpansionRequest>,
    lesson_requests: Vec<LessonContentRequest>,
    regeneration_requests: Vec<ComponentRegenerationRequest>,
}

#[derive(Debug, Default)]
pub struct ScriptedProvider {
    skeletons: Script<OutlineSkeleton>,
    sections: Script<ExpandedSection>,
    lessons: Script<LessonContent>,
    components: Script<JsonValue>,
    recorded: Mutex<Recorded>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skeleton with one section per entry, each with the given lesson titles.
    pub fn skeleton(sections: &[(&str, &[&str])]) -> OutlineSkeleton {
        OutlineSkeleton {
            sections: sections
                .iter()
                .map(|(title, lessons)| SectionSkeleton {
                    title: title.to_string(),
                    description: format!("About {title}"),
                    lesson_titles: lessons.iter().map(|l| l.to_string()).collect(),
                })
                .collect(),
        }
    }

    pub fn push_skeleton(&self, result: Result<OutlineSkeleton, AiError>) -> &Self {
        push(&self.skeletons, result);
        self
    }

    pub fn push_section(&self, result: Result<ExpandedSection, AiError>) -> &Self {
        push(&self.sections, result);
        self
    }

    pub fn push_lesson(&self, result: Result<LessonContent, AiError>) -> &Self {
        push(&self.lessons, result);
        self
    }

    pub fn push_component(&self, result: Result<JsonValue, AiError>) -> &Self {
        push(&self.components, result);
        self
    }

    pub fn calls(&self) -> ProviderCalls {
        self.recorded.lock().unwrap().calls
    }

    pub fn total_calls(&self) -> usize {
        self.calls().total()
    }

    pub fn outline_requests(&self) -> Vec<OutlineRequest> {
        self.recorded.lock().unwrap().outline_requests.clone()
    }

    pub fn section_requests(&self) -> Vec<SectionExpansionRequest> {
        self.recorded.lock().unwrap().section_requests.clone()
    }

    pub fn lesson_requests(&self) -> Vec<LessonContentRequest> {
        self.recorded.lock().unwrap().lesson_requests.clone()
    }

    pub fn regeneration_requests(&self) -> Vec<ComponentRegenerationRequest> {
        self.recorded.lock().unwrap().regeneration_requests.clone()
    }

    fn record(&self, f: impl FnOnce(&mut Recorded)) {
        f(&mut self.recorded.lock().unwrap());
    }
}

fn push<T>(script: &Script<T>, result: Result<T, AiError>) {
    script
        .lock()
        .unwrap()
        .push_back(result.map(|output| Generated::new(output, DEFAULT_TOKENS)));
}

fn next<T>(script: &Script<T>) -> Option<Result<Generated<T>, AiError>> {
    script.lock().unwrap().pop_front()
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn generate_outline_skeleton(
        &self,
        request: &OutlineRequest,
    ) -> Result<Generated<OutlineSkeleton>, AiError> {
        self.record(|r| {
            r.calls.outline_skeleton += 1;
            r.outline_requests.push(request.clone());
        });
        next(&self.skeletons).unwrap_or_else(|| {
            Ok(Generated::new(
                Self::skeleton(&[("Getting started", &["Welcome"])]),
                DEFAULT_TOKENS,
            ))
        })
    }

    async fn expand_section(
        &self,
        request: &SectionExpansionRequest,
    ) -> Result<Generated<ExpandedSection>, AiError> {
        self.record(|r| {
            r.calls.expand_section += 1;
            r.section_requests.push(request.clone());
        });
        next(&self.sections).unwrap_or_else(|| {
            let lessons = request
                .lesson_titles
                .iter()
                .map(|title| LessonDetail {
                    title: title.clone(),
                    description: format!("{title} explained"),
                    duration_minutes: 15,
                    objectives: vec![format!("Understand {title}")],
                })
                .collect();
            Ok(Generated::new(ExpandedSection { lessons }, DEFAULT_TOKENS))
        })
    }

    async fn generate_lesson_content(
        &self,
        request: &LessonContentRequest,
    ) -> Result<Generated<LessonContent>, AiError> {
        self.record(|r| {
            r.calls.lesson_content += 1;
            r.lesson_requests.push(request.clone());
        });
        next(&self.lessons).unwrap_or_else(|| {
            Ok(Generated::new(
                LessonContent {
                    components: vec![
                        GeneratedComponent {
                            component_type: ComponentType::Heading,
                            content: json!({"text": request.lesson_title}),
                        },
                        GeneratedComponent {
                            component_type: ComponentType::Text,
                            content: json!({"markdown": request.description}),
                        },
                    ],
                    segue: Some("Up next".to_string()),
                },
                DEFAULT_TOKENS,
            ))
        })
    }

    async fn regenerate_component(
        &self,
        request: &ComponentRegenerationRequest,
    ) -> Result<Generated<JsonValue>, AiError> {
        self.record(|r| {
            r.calls.regenerate_component += 1;
            r.regeneration_requests.push(request.clone());
        });
        next(&self.components).unwrap_or_else(|| {
            Ok(Generated::new(
                json!({"text": format!("rewritten: {}", request.instruction)}),
                DEFAULT_TOKENS,
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_results_are_consumed_in_order_then_defaults_apply() {
        let provider = ScriptedProvider::new();
        provider
            .push_section(Err(AiError::RequestFailed("boom".to_string())))
            .push_section(Ok(ExpandedSection { lessons: vec![] }));

        let request = SectionExpansionRequest {
            course_title: "C".to_string(),
            desired_outcome: "O".to_string(),
            section_title: "S".to_string(),
            section_description: String::new(),
            lesson_titles: vec!["A".to_string(), "B".to_string()],
            knowledge: vec![],
            audience: vec![],
            additional_context: None,
        };

        assert!(provider.expand_section(&request).await.is_err());
        assert!(provider.expand_section(&request).await.unwrap().output.lessons.is_empty());
        let fallback = provider.expand_section(&request).await.unwrap();
        assert_eq!(fallback.output.lessons.len(), 2);

        assert_eq!(provider.calls().expand_section, 3);
        assert_eq!(provider.total_calls(), 3);
    }
}

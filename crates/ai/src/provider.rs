use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::result::AiError;
use crate::types::{
    ComponentRegenerationRequest, ExpandedSection, LessonContent, LessonContentRequest,
    OutlineRequest, OutlineSkeleton, SectionExpansionRequest,
};

/// Structured provider output plus the tokens the call consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    pub output: T,
    pub tokens_used: u64,
}

impl<T> Generated<T> {
    pub fn new(output: T, tokens_used: u64) -> Self {
        Self {
            output,
            tokens_used,
        }
    }
}

/// Capability of a generative model used by the engine.
///
/// Outline generation is split into two calls because a single fully-nested
/// section → lesson → objectives schema can exceed provider schema-nesting limits:
/// `generate_outline_skeleton` returns sections with lesson titles only, then
/// `expand_section` is called once per section.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider/model identifier, for logs.
    fn id(&self) -> &str;

    async fn generate_outline_skeleton(
        &self,
        request: &OutlineRequest,
    ) -> Result<Generated<OutlineSkeleton>, AiError>;

    async fn expand_section(
        &self,
        request: &SectionExpansionRequest,
    ) -> Result<Generated<ExpandedSection>, AiError>;

    async fn generate_lesson_content(
        &self,
        request: &LessonContentRequest,
    ) -> Result<Generated<LessonContent>, AiError>;

    /// Rewrite one component's payload following a free-form instruction.
    async fn regenerate_component(
        &self,
        request: &ComponentRegenerationRequest,
    ) -> Result<Generated<JsonValue>, AiError>;
}

//! `courseforge-ai`
//!
//! **Responsibility:** the AI provider port used by the generation engine.
//!
//! This crate is intentionally **not** aware of jobs or storage:
//! - Every request is fully resolved by the caller (no lookups happen here).
//! - Every call returns its structured output plus the tokens it consumed.
//! - Calls are remote, rate-limited and not idempotent; callers own retry policy.

pub mod budget;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod result;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use budget::{KnowledgeBudget, DEFAULT_MAX_CHUNKS_PER_SOURCE, DEFAULT_MAX_CHUNK_CHARS};
pub use openai::OpenAiCompatibleProvider;
pub use provider::{AiProvider, Generated};
pub use result::AiError;
pub use types::{
    AudienceProfile, ComponentRegenerationRequest, ExpandedSection, GeneratedComponent,
    KnowledgeDigest, LessonContent, LessonContentRequest, LessonContext, LessonDetail,
    NeighboringLessons, OutlineRequest, OutlineSkeleton, SectionExpansionRequest,
    SectionSkeleton,
};

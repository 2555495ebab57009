//! `courseforge-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the closed enumerations shared by the provider port and the stores,
//! and the domain error model.

pub mod course;
pub mod error;
pub mod id;

pub use course::{ApprovalStatus, ComponentType};
pub use error::{DomainError, DomainResult};
pub use id::{
    AudienceId, ComponentId, CourseId, GenerationInputId, JobId, KnowledgeSourceId, LessonId, OutlineId,
    OutlineLessonId, SectionId, TenantId, UserId,
};

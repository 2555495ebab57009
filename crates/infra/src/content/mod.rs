//! Content produced by generation jobs: outline trees and generated lessons.
//!
//! Ownership is tenant-scoped and enforced by every store method. Multi-row
//! writes are atomic so readers never observe a half-written tree.

pub mod postgres;
pub mod store;
pub mod types;

pub use postgres::PostgresContentStore;
pub use store::{ContentStore, ContentStoreError, InMemoryContentStore};
pub use types::{
    ComponentDraft, CourseGenerationInput, CourseOutline, GeneratedLesson, GeneratedLessonDraft,
    LessonComponent, LessonDraft, LessonWithComponents, OutlineDraft, OutlineLesson,
    OutlineSection, OutlineTree, SectionDraft,
};

//! Step orchestration for claimed generation jobs.
//!
//! ## Pipelines
//!
//! - Outline: `gathering_knowledge` (10) → `analyzing_audience` (20) →
//!   `generating` (40) → `storing` (70) → completed (100)
//! - Lesson: `loading_context` (10) → `generating` (30) → `storing` (70) →
//!   completed (100)
//!
//! Outline generation calls the provider once for a skeleton, then once per
//! section. A failed section is skipped; the job still completes if at least
//! one section was expanded.

mod error;
mod inputs;
mod lesson;
mod orchestrator;
mod outline;


pub use error::GenerationError;
pub(crate) use inputs::outline_input;
pub use orchestrator::{JobOutcome, Orchestrator};

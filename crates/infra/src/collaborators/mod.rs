//! Ports to systems the engine consumes but does not own.
//!
//! - `Catalog`: courses, knowledge sources and target audiences (read-only)
//! - `NotificationSink`: fire-and-forget terminal job notifications
//! - `CacheInvalidator`: course-keyed cache invalidation after content changes

pub mod cache;
pub mod catalog;
pub mod notifications;
pub mod postgres_catalog;

pub use cache::{CacheInvalidator, InMemoryCacheInvalidator, NoopCacheInvalidator};
#[cfg(feature = "redis")]
pub use cache::RedisCacheInvalidator;
pub use catalog::{Audience, Catalog, CourseInfo, InMemoryCatalog, KnowledgeSource};
pub use notifications::{
    InMemoryNotificationSink, JobNotification, NotificationSink, TracingNotificationSink,
};
pub use postgres_catalog::PostgresCatalog;

/// Failure talking to a collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator returned invalid data: {0}")]
    InvalidData(String),
}

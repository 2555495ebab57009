use courseforge_ai::AiError;

use crate::collaborators::CollaboratorError;
use crate::content::ContentStoreError;
use crate::jobs::{FailureKind, JobStoreError};

/// Why a job attempt stopped before completing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("job was cancelled")]
    Cancelled,
    /// Another worker reclaimed the job, or the row left `processing`.
    #[error("claim lost")]
    ClaimLost,
}

impl GenerationError {
    /// Failure class recorded on the job. `None` for stops that are not failures.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            GenerationError::Validation(_) => Some(FailureKind::Validation),
            GenerationError::NotFound(_) => Some(FailureKind::NotFound),
            GenerationError::Provider(_) => Some(FailureKind::Provider),
            GenerationError::Store(_) => Some(FailureKind::Store),
            GenerationError::Cancelled | GenerationError::ClaimLost => None,
        }
    }

    /// A store failure after provider output was produced.
    pub(crate) fn results_not_saved(err: ContentStoreError) -> Self {
        match err {
            ContentStoreError::NotFound { .. } | ContentStoreError::Validation(_) => err.into(),
            other => GenerationError::Store(format!(
                "{other}; generated content was not saved and may be lost"
            )),
        }
    }
}

impl From<AiError> for GenerationError {
    fn from(err: AiError) -> Self {
        GenerationError::Provider(err.to_string())
    }
}

impl From<JobStoreError> for GenerationError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::ClaimLost(_) | JobStoreError::NotFound(_) => GenerationError::ClaimLost,
            other => GenerationError::Store(other.to_string()),
        }
    }
}

impl From<ContentStoreError> for GenerationError {
    fn from(err: ContentStoreError) -> Self {
        match err {
            ContentStoreError::NotFound { .. } => GenerationError::NotFound(err.to_string()),
            ContentStoreError::Validation(msg) => GenerationError::Validation(msg),
            ContentStoreError::InvalidReview { .. } => GenerationError::Validation(err.to_string()),
            ContentStoreError::Storage(msg) => GenerationError::Store(msg),
        }
    }
}

impl From<CollaboratorError> for GenerationError {
    fn from(err: CollaboratorError) -> Self {
        GenerationError::Store(err.to_string())
    }
}

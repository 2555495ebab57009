use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use courseforge_core::{AudienceId, CourseId, KnowledgeSourceId, TenantId};

use super::CollaboratorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseInfo {
    pub id: CourseId,
    pub tenant_id: TenantId,
    pub title: String,
}

/// A knowledge source with (at most `max_chunks`) content chunks in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeSource {
    pub id: KnowledgeSourceId,
    pub name: String,
    pub domain: String,
    pub summary: Option<String>,
    pub chunks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audience {
    pub id: AudienceId,
    pub name: String,
    pub description: Option<String>,
}

/// Read-only lookups into the course and knowledge libraries.
///
/// Lookups by id list omit ids that do not resolve for the tenant; callers
/// decide whether a partial result is acceptable.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn course(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Option<CourseInfo>, CollaboratorError>;

    async fn knowledge_sources(
        &self,
        tenant_id: TenantId,
        ids: &[KnowledgeSourceId],
        max_chunks: usize,
    ) -> Result<Vec<KnowledgeSource>, CollaboratorError>;

    async fn audiences(
        &self,
        tenant_id: TenantId,
        ids: &[AudienceId],
    ) -> Result<Vec<Audience>, CollaboratorError>;
}

#[derive(Debug, Default)]
struct Entries {
    courses: HashMap<CourseId, CourseInfo>,
    sources: HashMap<KnowledgeSourceId, (TenantId, KnowledgeSource)>,
    audiences: HashMap<AudienceId, (TenantId, Audience)>,
}

/// In-memory catalog for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    inner: RwLock<Entries>,
}

fn poisoned<T>(_: T) -> CollaboratorError {
    CollaboratorError::Unavailable("catalog lock poisoned".to_string())
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_course(&self, tenant_id: TenantId, title: impl Into<String>) -> CourseId {
        let id = CourseId::new();
        if let Ok(mut entries) = self.inner.write() {
            entries.courses.insert(
                id,
                CourseInfo {
                    id,
                    tenant_id,
                    title: title.into(),
                },
            );
        }
        id
    }

    pub fn add_knowledge_source(
        &self,
        tenant_id: TenantId,
        name: impl Into<String>,
        domain: impl Into<String>,
        chunks: Vec<String>,
    ) -> KnowledgeSourceId {
        let id = KnowledgeSourceId::new();
        if let Ok(mut entries) = self.inner.write() {
            entries.sources.insert(
                id,
                (
                    tenant_id,
                    KnowledgeSource {
                        id,
                        name: name.into(),
                        domain: domain.into(),
                        summary: None,
                        chunks,
                    },
                ),
            );
        }
        id
    }

    pub fn add_audience(
        &self,
        tenant_id: TenantId,
        name: impl Into<String>,
        description: Option<String>,
    ) -> AudienceId {
        let id = AudienceId::new();
        if let Ok(mut entries) = self.inner.write() {
            entries.audiences.insert(
                id,
                (
                    tenant_id,
                    Audience {
                        id,
                        name: name.into(),
                        description,
                    },
                ),
            );
        }
        id
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn course(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Option<CourseInfo>, CollaboratorError> {
        let entries = self.inner.read().map_err(poisoned)?;
        Ok(entries
            .courses
            .get(&course_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn knowledge_sources(
        &self,
        tenant_id: TenantId,
        ids: &[KnowledgeSourceId],
        max_chunks: usize,
    ) -> Result<Vec<KnowledgeSource>, CollaboratorError> {
        let entries = self.inner.read().map_err(poisoned)?;
        Ok(ids
            .iter()
            .filter_map(|id| entries.sources.get(id))
            .filter(|(tenant, _)| *tenant == tenant_id)
            .map(|(_, source)| {
                let mut source = source.clone();
                source.chunks.truncate(max_chunks);
                source
            })
            .collect())
    }

    async fn audiences(
        &self,
        tenant_id: TenantId,
        ids: &[AudienceId],
    ) -> Result<Vec<Audience>, CollaboratorError> {
        let entries = self.inner.read().map_err(poisoned)?;
        Ok(ids
            .iter()
            .filter_map(|id| entries.audiences.get(id))
            .filter(|(tenant, _)| *tenant == tenant_id)
            .map(|(_, audience)| audience.clone())
            .collect())
    }
}

//! Catalog adapter over the course/knowledge library tables.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use courseforge_core::{AudienceId, CourseId, KnowledgeSourceId, TenantId};

use super::catalog::{Audience, Catalog, CourseInfo, KnowledgeSource};
use super::CollaboratorError;

#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: Arc<PgPool>,
}

impl PostgresCatalog {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> CollaboratorError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            CollaboratorError::InvalidData(format!("{operation}: {err}"))
        }
        _ => CollaboratorError::Unavailable(format!("{operation}: {err}")),
    }
}

#[async_trait]
impl Catalog for PostgresCatalog {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, course_id = %course_id), err)]
    async fn course(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Option<CourseInfo>, CollaboratorError> {
        let row = sqlx::query("SELECT id, tenant_id, title FROM courses WHERE id = $1 AND tenant_id = $2")
            .bind(*course_id.as_uuid())
            .bind(*tenant_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("course", e))?;

        row.map(|r| {
            Ok(CourseInfo {
                id: CourseId::from_uuid(r.try_get("id")?),
                tenant_id: TenantId::from_uuid(r.try_get("tenant_id")?),
                title: r.try_get("title")?,
            })
        })
        .transpose()
        .map_err(|e| map_sqlx_error("course", e))
    }

    #[instrument(skip(self, ids), fields(tenant_id = %tenant_id, requested = ids.len()), err)]
    async fn knowledge_sources(
        &self,
        tenant_id: TenantId,
        ids: &[KnowledgeSourceId],
        max_chunks: usize,
    ) -> Result<Vec<KnowledgeSource>, CollaboratorError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();

        let source_rows = sqlx::query(
            r#"
            SELECT id, name, domain, summary
            FROM knowledge_sources
            WHERE tenant_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(&uuids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("knowledge_sources", e))?;

        // First `max_chunks` chunks of every source in one round trip.
        let chunk_rows = sqlx::query(
            r#"
            SELECT source_id, content
            FROM (
                SELECT c.source_id, c.content,
                       ROW_NUMBER() OVER (PARTITION BY c.source_id ORDER BY c.position) AS rn
                FROM knowledge_chunks c
                JOIN knowledge_sources s ON s.id = c.source_id
                WHERE s.tenant_id = $1 AND c.source_id = ANY($2)
            ) ranked
            WHERE rn <= $3
            ORDER BY source_id, rn
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(&uuids)
        .bind(i64::try_from(max_chunks).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("knowledge_chunks", e))?;

        let mut chunks: HashMap<Uuid, Vec<String>> = HashMap::new();
        for row in chunk_rows {
            let source_id: Uuid = row.try_get("source_id").map_err(|e| map_sqlx_error("knowledge_chunks", e))?;
            let content: String = row.try_get("content").map_err(|e| map_sqlx_error("knowledge_chunks", e))?;
            chunks.entry(source_id).or_default().push(content);
        }

        let mut by_id = HashMap::with_capacity(source_rows.len());
        for row in source_rows {
            let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("knowledge_sources", e))?;
            let source = KnowledgeSource {
                id: KnowledgeSourceId::from_uuid(id),
                name: row.try_get("name").map_err(|e| map_sqlx_error("knowledge_sources", e))?,
                domain: row.try_get("domain").map_err(|e| map_sqlx_error("knowledge_sources", e))?,
                summary: row.try_get("summary").map_err(|e| map_sqlx_error("knowledge_sources", e))?,
                chunks: chunks.remove(&id).unwrap_or_default(),
            };
            by_id.insert(id, source);
        }

        // Keep the caller's order.
        Ok(uuids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    #[instrument(skip(self, ids), fields(tenant_id = %tenant_id, requested = ids.len()), err)]
    async fn audiences(
        &self,
        tenant_id: TenantId,
        ids: &[AudienceId],
    ) -> Result<Vec<Audience>, CollaboratorError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();

        let rows = sqlx::query(
            r#"
            SELECT id, name, description
            FROM target_audiences
            WHERE tenant_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(&uuids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("audiences", e))?;

        let mut by_id = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("audiences", e))?;
            by_id.insert(
                id,
                Audience {
                    id: AudienceId::from_uuid(id),
                    name: row.try_get("name").map_err(|e| map_sqlx_error("audiences", e))?,
                    description: row
                        .try_get("description")
                        .map_err(|e| map_sqlx_error("audiences", e))?,
                },
            );
        }

        Ok(uuids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

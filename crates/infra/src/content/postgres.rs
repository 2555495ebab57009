//! Postgres-backed content store.
//!
//! Tree writes run in one transaction. Outline versions for a course are
//! serialised with a transaction-scoped advisory lock keyed by course id.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use courseforge_core::{
    ApprovalStatus, AudienceId, ComponentId, CourseId, GenerationInputId, JobId, KnowledgeSourceId,
    LessonId, OutlineId, OutlineLessonId, SectionId, TenantId, UserId,
};

use crate::jobs::postgres::decode_enum;

use super::store::{check_review, validate_outline_draft, ContentStore, ContentStoreError};
use super::types::{
    CourseGenerationInput, CourseOutline, GeneratedLesson, GeneratedLessonDraft, LessonComponent,
    LessonWithComponents, OutlineDraft, OutlineLesson, OutlineSection, OutlineTree,
};

/// Postgres content store.
#[derive(Debug, Clone)]
pub struct PostgresContentStore {
    pool: Arc<PgPool>,
}

impl PostgresContentStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'static, Postgres>, ContentStoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }
}

#[async_trait]
impl ContentStore for PostgresContentStore {
    #[instrument(
        skip(self, input),
        fields(tenant_id = %input.tenant_id, course_id = %input.course_id, input_id = %input.id),
        err
    )]
    async fn save_generation_input(&self, input: CourseGenerationInput) -> Result<(), ContentStoreError> {
        sqlx::query(
            r#"
            INSERT INTO course_generation_inputs (
                id, tenant_id, course_id, knowledge_source_ids, audience_ids,
                desired_outcome, additional_context, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(*input.id.as_uuid())
        .bind(*input.tenant_id.as_uuid())
        .bind(*input.course_id.as_uuid())
        .bind(input.knowledge_source_ids.iter().map(|id| *id.as_uuid()).collect::<Vec<Uuid>>())
        .bind(input.audience_ids.iter().map(|id| *id.as_uuid()).collect::<Vec<Uuid>>())
        .bind(&input.desired_outcome)
        .bind(input.additional_context.as_deref())
        .bind(*input.created_by.as_uuid())
        .bind(input.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => ContentStoreError::Validation(
                format!("generation input {} already exists", input.id),
            ),
            other => map_sqlx_error("save_generation_input", other),
        })?;

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, input_id = %input_id), err)]
    async fn get_generation_input(
        &self,
        tenant_id: TenantId,
        input_id: GenerationInputId,
    ) -> Result<Option<CourseGenerationInput>, ContentStoreError> {
        let row = sqlx::query("SELECT * FROM course_generation_inputs WHERE id = $1 AND tenant_id = $2")
            .bind(*input_id.as_uuid())
            .bind(*tenant_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_generation_input", e))?;

        row.as_ref()
            .map(decode_input)
            .transpose()
            .map_err(|e| map_sqlx_error("get_generation_input", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, course_id = %course_id), err)]
    async fn latest_generation_input(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Option<CourseGenerationInput>, ContentStoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM course_generation_inputs
            WHERE tenant_id = $1 AND course_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*course_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_generation_input", e))?;

        row.as_ref()
            .map(decode_input)
            .transpose()
            .map_err(|e| map_sqlx_error("latest_generation_input", e))
    }

    #[instrument(
        skip(self, draft),
        fields(tenant_id = %tenant_id, course_id = %course_id, sections = draft.sections.len()),
        err
    )]
    async fn store_outline(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
        generated_by: Option<JobId>,
        draft: &OutlineDraft,
    ) -> Result<OutlineTree, ContentStoreError> {
        validate_outline_draft(draft)?;
        let op = "store_outline";
        let mut tx = self.begin(op).await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(course_id.as_uuid().to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;

        let version: i32 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(version), 0) + 1
            FROM course_outlines
            WHERE tenant_id = $1 AND course_id = $2
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*course_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let outline = CourseOutline {
            id: OutlineId::new(),
            tenant_id,
            course_id,
            version: u32::try_from(version).unwrap_or(0),
            approval_status: ApprovalStatus::PendingReview,
            generated_by,
            created_at: Utc::now(),
            reviewed_by: None,
            reviewed_at: None,
        };
        let (sections, lessons) = draft.materialize(tenant_id, outline.id);

        sqlx::query(
            r#"
            INSERT INTO course_outlines (id, tenant_id, course_id, version, approval_status, generated_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*outline.id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .bind(*course_id.as_uuid())
        .bind(version)
        .bind(outline.approval_status.as_str())
        .bind(generated_by.map(|j| *j.as_uuid()))
        .bind(outline.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        for section in &sections {
            sqlx::query(
                r#"
                INSERT INTO outline_sections (id, tenant_id, outline_id, position, title, description)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(*section.id.as_uuid())
            .bind(*tenant_id.as_uuid())
            .bind(*outline.id.as_uuid())
            .bind(to_i32(section.position))
            .bind(&section.title)
            .bind(&section.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        }

        for lesson in &lessons {
            sqlx::query(
                r#"
                INSERT INTO outline_lessons (
                    id, tenant_id, outline_id, section_id, position, title, description,
                    duration_minutes, objectives, is_last_in_section, is_last_in_course
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(*lesson.id.as_uuid())
            .bind(*tenant_id.as_uuid())
            .bind(*outline.id.as_uuid())
            .bind(*lesson.section_id.as_uuid())
            .bind(to_i32(lesson.position))
            .bind(&lesson.title)
            .bind(&lesson.description)
            .bind(to_i32(lesson.duration_minutes))
            .bind(&lesson.objectives)
            .bind(lesson.is_last_in_section)
            .bind(lesson.is_last_in_course)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error(op, e))?;

        Ok(OutlineTree {
            outline,
            sections,
            lessons,
        })
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, course_id = %course_id), err)]
    async fn latest_outline(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Option<CourseOutline>, ContentStoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM course_outlines
            WHERE tenant_id = $1 AND course_id = $2
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*course_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_outline", e))?;

        row.as_ref()
            .map(decode_outline)
            .transpose()
            .map_err(|e| map_sqlx_error("latest_outline", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, outline_id = %outline_id), err)]
    async fn get_outline(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> Result<Option<CourseOutline>, ContentStoreError> {
        let row = sqlx::query("SELECT * FROM course_outlines WHERE id = $1 AND tenant_id = $2")
            .bind(*outline_id.as_uuid())
            .bind(*tenant_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_outline", e))?;

        row.as_ref()
            .map(decode_outline)
            .transpose()
            .map_err(|e| map_sqlx_error("get_outline", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, course_id = %course_id), err)]
    async fn list_outlines(
        &self,
        tenant_id: TenantId,
        course_id: CourseId,
    ) -> Result<Vec<CourseOutline>, ContentStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM course_outlines
            WHERE tenant_id = $1 AND course_id = $2
            ORDER BY version
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*course_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_outlines", e))?;

        rows.iter()
            .map(decode_outline)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_outlines", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, outline_id = %outline_id), err)]
    async fn list_sections(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> Result<Vec<OutlineSection>, ContentStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM outline_sections
            WHERE tenant_id = $1 AND outline_id = $2
            ORDER BY position
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*outline_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_sections", e))?;

        rows.iter()
            .map(decode_section)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_sections", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, section_id = %section_id), err)]
    async fn get_section(
        &self,
        tenant_id: TenantId,
        section_id: SectionId,
    ) -> Result<Option<OutlineSection>, ContentStoreError> {
        let row = sqlx::query("SELECT * FROM outline_sections WHERE id = $1 AND tenant_id = $2")
            .bind(*section_id.as_uuid())
            .bind(*tenant_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_section", e))?;

        row.as_ref()
            .map(decode_section)
            .transpose()
            .map_err(|e| map_sqlx_error("get_section", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, outline_id = %outline_id), err)]
    async fn list_outline_lessons(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> Result<Vec<OutlineLesson>, ContentStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT l.*
            FROM outline_lessons l
            JOIN outline_sections s ON s.id = l.section_id
            WHERE l.tenant_id = $1 AND l.outline_id = $2
            ORDER BY s.position, l.position
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*outline_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_outline_lessons", e))?;

        rows.iter()
            .map(decode_outline_lesson)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_outline_lessons", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, outline_lesson_id = %outline_lesson_id), err)]
    async fn get_outline_lesson(
        &self,
        tenant_id: TenantId,
        outline_lesson_id: OutlineLessonId,
    ) -> Result<Option<OutlineLesson>, ContentStoreError> {
        let row = sqlx::query("SELECT * FROM outline_lessons WHERE id = $1 AND tenant_id = $2")
            .bind(*outline_lesson_id.as_uuid())
            .bind(*tenant_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_outline_lesson", e))?;

        row.as_ref()
            .map(decode_outline_lesson)
            .transpose()
            .map_err(|e| map_sqlx_error("get_outline_lesson", e))
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, outline_id = %outline_id, decision = %decision),
        err
    )]
    async fn review_outline(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
        decision: ApprovalStatus,
        reviewer: UserId,
    ) -> Result<CourseOutline, ContentStoreError> {
        let op = "review_outline";
        let mut tx = self.begin(op).await?;

        let row = sqlx::query(
            "SELECT * FROM course_outlines WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
        )
        .bind(*outline_id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?
        .ok_or_else(|| ContentStoreError::not_found("outline", outline_id))?;

        let mut outline = decode_outline(&row).map_err(|e| map_sqlx_error(op, e))?;
        check_review(&outline, decision)?;

        outline.approval_status = decision;
        outline.reviewed_by = Some(reviewer);
        outline.reviewed_at = Some(Utc::now());

        sqlx::query(
            r#"
            UPDATE course_outlines
            SET approval_status = $2, reviewed_by = $3, reviewed_at = $4
            WHERE id = $1
            "#,
        )
        .bind(*outline_id.as_uuid())
        .bind(decision.as_str())
        .bind(*reviewer.as_uuid())
        .bind(outline.reviewed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        tx.commit().await.map_err(|e| map_sqlx_error(op, e))?;
        Ok(outline)
    }

    #[instrument(
        skip(self, draft),
        fields(
            tenant_id = %tenant_id,
            outline_lesson_id = %draft.outline_lesson_id,
            components = draft.components.len()
        ),
        err
    )]
    async fn store_generated_lesson(
        &self,
        tenant_id: TenantId,
        draft: &GeneratedLessonDraft,
    ) -> Result<LessonWithComponents, ContentStoreError> {
        let op = "store_generated_lesson";
        let mut tx = self.begin(op).await?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM outline_lessons WHERE id = $1 AND tenant_id = $2)",
        )
        .bind(*draft.outline_lesson_id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;
        if !exists {
            return Err(ContentStoreError::not_found("outline lesson", draft.outline_lesson_id));
        }

        // Components cascade with their lesson.
        sqlx::query("DELETE FROM generated_lessons WHERE outline_lesson_id = $1 AND tenant_id = $2")
            .bind(*draft.outline_lesson_id.as_uuid())
            .bind(*tenant_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;

        let stored = draft.materialize(tenant_id);
        let lesson = &stored.lesson;

        sqlx::query(
            r#"
            INSERT INTO generated_lessons (id, tenant_id, course_id, outline_lesson_id, segue, generated_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*lesson.id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .bind(*lesson.course_id.as_uuid())
        .bind(*lesson.outline_lesson_id.as_uuid())
        .bind(lesson.segue.as_deref())
        .bind(lesson.generated_by.map(|j| *j.as_uuid()))
        .bind(lesson.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        for component in &stored.components {
            sqlx::query(
                r#"
                INSERT INTO lesson_components (id, tenant_id, lesson_id, position, component_type, content, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(*component.id.as_uuid())
            .bind(*tenant_id.as_uuid())
            .bind(*lesson.id.as_uuid())
            .bind(to_i32(component.position))
            .bind(component.component_type.as_str())
            .bind(&component.content)
            .bind(component.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(op, e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error(op, e))?;
        Ok(stored)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, outline_lesson_id = %outline_lesson_id), err)]
    async fn get_generated_lesson(
        &self,
        tenant_id: TenantId,
        outline_lesson_id: OutlineLessonId,
    ) -> Result<Option<LessonWithComponents>, ContentStoreError> {
        let op = "get_generated_lesson";
        let Some(row) = sqlx::query(
            "SELECT * FROM generated_lessons WHERE outline_lesson_id = $1 AND tenant_id = $2",
        )
        .bind(*outline_lesson_id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?
        else {
            return Ok(None);
        };

        let lesson = decode_lesson(&row).map_err(|e| map_sqlx_error(op, e))?;

        let rows = sqlx::query(
            r#"
            SELECT * FROM lesson_components
            WHERE lesson_id = $1 AND tenant_id = $2
            ORDER BY position
            "#,
        )
        .bind(*lesson.id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(op, e))?;

        let components = rows
            .iter()
            .map(decode_component)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(op, e))?;

        Ok(Some(LessonWithComponents { lesson, components }))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, outline_id = %outline_id), err)]
    async fn list_generated_lessons(
        &self,
        tenant_id: TenantId,
        outline_id: OutlineId,
    ) -> Result<Vec<GeneratedLesson>, ContentStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT g.*
            FROM generated_lessons g
            JOIN outline_lessons ol ON ol.id = g.outline_lesson_id
            JOIN outline_sections s ON s.id = ol.section_id
            WHERE g.tenant_id = $1 AND ol.outline_id = $2
            ORDER BY s.position, ol.position
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(*outline_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_generated_lessons", e))?;

        rows.iter()
            .map(decode_lesson)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_generated_lessons", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, lesson_id = %lesson_id), err)]
    async fn get_lesson(
        &self,
        tenant_id: TenantId,
        lesson_id: LessonId,
    ) -> Result<Option<GeneratedLesson>, ContentStoreError> {
        let row = sqlx::query("SELECT * FROM generated_lessons WHERE id = $1 AND tenant_id = $2")
            .bind(*lesson_id.as_uuid())
            .bind(*tenant_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_lesson", e))?;

        row.as_ref()
            .map(decode_lesson)
            .transpose()
            .map_err(|e| map_sqlx_error("get_lesson", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, component_id = %component_id), err)]
    async fn get_component(
        &self,
        tenant_id: TenantId,
        component_id: ComponentId,
    ) -> Result<Option<LessonComponent>, ContentStoreError> {
        let row = sqlx::query("SELECT * FROM lesson_components WHERE id = $1 AND tenant_id = $2")
            .bind(*component_id.as_uuid())
            .bind(*tenant_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_component", e))?;

        row.as_ref()
            .map(decode_component)
            .transpose()
            .map_err(|e| map_sqlx_error("get_component", e))
    }

    #[instrument(skip(self, content), fields(tenant_id = %tenant_id, component_id = %component_id), err)]
    async fn update_component_content(
        &self,
        tenant_id: TenantId,
        component_id: ComponentId,
        content: JsonValue,
    ) -> Result<LessonComponent, ContentStoreError> {
        if content.is_null() {
            return Err(ContentStoreError::Validation(
                "component content must not be null".to_string(),
            ));
        }

        let row = sqlx::query(
            r#"
            UPDATE lesson_components
            SET content = $3, updated_at = $4
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(*component_id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .bind(&content)
        .bind(Utc::now())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_component_content", e))?
        .ok_or_else(|| ContentStoreError::not_found("component", component_id))?;

        decode_component(&row).map_err(|e| map_sqlx_error("update_component_content", e))
    }
}

fn decode_input(row: &PgRow) -> Result<CourseGenerationInput, sqlx::Error> {
    let sources: Vec<Uuid> = row.try_get("knowledge_source_ids")?;
    let audiences: Vec<Uuid> = row.try_get("audience_ids")?;
    Ok(CourseGenerationInput {
        id: GenerationInputId::from_uuid(row.try_get("id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        course_id: CourseId::from_uuid(row.try_get("course_id")?),
        knowledge_source_ids: sources.into_iter().map(KnowledgeSourceId::from_uuid).collect(),
        audience_ids: audiences.into_iter().map(AudienceId::from_uuid).collect(),
        desired_outcome: row.try_get("desired_outcome")?,
        additional_context: row.try_get("additional_context")?,
        created_by: UserId::from_uuid(row.try_get("created_by")?),
        created_at: row.try_get("created_at")?,
    })
}

fn decode_outline(row: &PgRow) -> Result<CourseOutline, sqlx::Error> {
    let version: i32 = row.try_get("version")?;
    let status: String = row.try_get("approval_status")?;
    Ok(CourseOutline {
        id: OutlineId::from_uuid(row.try_get("id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        course_id: CourseId::from_uuid(row.try_get("course_id")?),
        version: to_u32(version),
        approval_status: decode_enum("approval_status", status)?,
        generated_by: row.try_get::<Option<Uuid>, _>("generated_by")?.map(JobId::from_uuid),
        created_at: row.try_get("created_at")?,
        reviewed_by: row.try_get::<Option<Uuid>, _>("reviewed_by")?.map(UserId::from_uuid),
        reviewed_at: row.try_get("reviewed_at")?,
    })
}

fn decode_section(row: &PgRow) -> Result<OutlineSection, sqlx::Error> {
    Ok(OutlineSection {
        id: SectionId::from_uuid(row.try_get("id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        outline_id: OutlineId::from_uuid(row.try_get("outline_id")?),
        position: to_u32(row.try_get("position")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
    })
}

fn decode_outline_lesson(row: &PgRow) -> Result<OutlineLesson, sqlx::Error> {
    Ok(OutlineLesson {
        id: OutlineLessonId::from_uuid(row.try_get("id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        outline_id: OutlineId::from_uuid(row.try_get("outline_id")?),
        section_id: SectionId::from_uuid(row.try_get("section_id")?),
        position: to_u32(row.try_get("position")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        duration_minutes: to_u32(row.try_get("duration_minutes")?),
        objectives: row.try_get("objectives")?,
        is_last_in_section: row.try_get("is_last_in_section")?,
        is_last_in_course: row.try_get("is_last_in_course")?,
    })
}

fn decode_lesson(row: &PgRow) -> Result<GeneratedLesson, sqlx::Error> {
    Ok(GeneratedLesson {
        id: LessonId::from_uuid(row.try_get("id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        course_id: CourseId::from_uuid(row.try_get("course_id")?),
        outline_lesson_id: OutlineLessonId::from_uuid(row.try_get("outline_lesson_id")?),
        segue: row.try_get("segue")?,
        generated_by: row.try_get::<Option<Uuid>, _>("generated_by")?.map(JobId::from_uuid),
        created_at: row.try_get("created_at")?,
    })
}

fn decode_component(row: &PgRow) -> Result<LessonComponent, sqlx::Error> {
    let component_type: String = row.try_get("component_type")?;
    Ok(LessonComponent {
        id: ComponentId::from_uuid(row.try_get("id")?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
        lesson_id: LessonId::from_uuid(row.try_get("lesson_id")?),
        position: to_u32(row.try_get("position")?),
        component_type: decode_enum("component_type", component_type)?,
        content: row.try_get("content")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> ContentStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Foreign key / check constraint violation
                Some("23503") | Some("23514") => ContentStoreError::Validation(msg),
                _ => ContentStoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            ContentStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => ContentStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    //! Run with `DATABASE_URL=postgres://… cargo test -- --ignored`.

    use super::*;
    use crate::content::types::{LessonDraft, SectionDraft};
    use crate::db;

    async fn store() -> PostgresContentStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = db::connect(&url, 4).await.unwrap();
        db::apply_schema(&pool).await.unwrap();
        PostgresContentStore::new(Arc::new(pool))
    }

    #[tokio::test]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn outline_round_trip_in_course_order() {
        let store = store().await;
        let tenant = TenantId::new();
        let course = CourseId::new();
        let draft = OutlineDraft {
            sections: (0..2)
                .map(|s| SectionDraft {
                    title: format!("S{s}"),
                    description: String::new(),
                    lessons: (0..2)
                        .map(|l| LessonDraft {
                            title: format!("L{s}.{l}"),
                            description: String::new(),
                            duration_minutes: 10,
                            objectives: vec!["obj".to_string()],
                        })
                        .collect(),
                })
                .collect(),
        };

        let tree = store.store_outline(tenant, course, None, &draft).await.unwrap();
        let again = store.store_outline(tenant, course, None, &draft).await.unwrap();
        assert_eq!(again.outline.version, tree.outline.version + 1);

        let lessons = store.list_outline_lessons(tenant, tree.outline.id).await.unwrap();
        assert_eq!(
            lessons.iter().map(|l| l.title.as_str()).collect::<Vec<_>>(),
            vec!["L0.0", "L0.1", "L1.0", "L1.1"]
        );
        assert!(lessons[3].is_last_in_course);
        assert!(store.list_outline_lessons(TenantId::new(), tree.outline.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn inputs_are_append_only_and_versions_list_in_order() {
        let store = store().await;
        let tenant = TenantId::new();
        let course = CourseId::new();
        let first = CourseGenerationInput {
            id: GenerationInputId::new(),
            tenant_id: tenant,
            course_id: course,
            knowledge_source_ids: vec![KnowledgeSourceId::new()],
            audience_ids: vec![],
            desired_outcome: "first".to_string(),
            additional_context: None,
            created_by: UserId::new(),
            created_at: Utc::now(),
        };
        let second = CourseGenerationInput {
            id: GenerationInputId::new(),
            desired_outcome: "second".to_string(),
            created_at: first.created_at + chrono::Duration::seconds(1),
            ..first.clone()
        };
        store.save_generation_input(first.clone()).await.unwrap();
        store.save_generation_input(second.clone()).await.unwrap();
        assert!(matches!(
            store.save_generation_input(first.clone()).await.unwrap_err(),
            ContentStoreError::Validation(_)
        ));

        let stored = store.get_generation_input(tenant, first.id).await.unwrap().unwrap();
        assert_eq!(stored.desired_outcome, "first");
        assert_eq!(stored.knowledge_source_ids, first.knowledge_source_ids);
        let latest = store.latest_generation_input(tenant, course).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);

        let draft = OutlineDraft {
            sections: vec![SectionDraft {
                title: "S".to_string(),
                description: String::new(),
                lessons: vec![LessonDraft {
                    title: "L".to_string(),
                    description: String::new(),
                    duration_minutes: 5,
                    objectives: vec![],
                }],
            }],
        };
        let one = store.store_outline(tenant, course, None, &draft).await.unwrap();
        let two = store.store_outline(tenant, course, None, &draft).await.unwrap();
        let ids: Vec<OutlineId> = store
            .list_outlines(tenant, course)
            .await
            .unwrap()
            .iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![one.outline.id, two.outline.id]);

        let section = store.get_section(tenant, two.sections[0].id).await.unwrap().unwrap();
        assert_eq!(section.outline_id, two.outline.id);
        assert!(store.list_generated_lessons(tenant, two.outline.id).await.unwrap().is_empty());
    }
}

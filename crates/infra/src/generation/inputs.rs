//! Resolving the frozen parameters behind stored content.

use courseforge_core::TenantId;

use crate::content::{ContentStore, ContentStoreError, CourseGenerationInput, CourseOutline};
use crate::jobs::{JobStore, JobStoreError};

/// Parameters of the outline job that produced `outline`.
///
/// Falls back to the course's newest submission when the outline has no
/// generating job on record or that job carries no input.
pub(crate) async fn outline_input<E>(
    jobs: &dyn JobStore,
    content: &dyn ContentStore,
    tenant_id: TenantId,
    outline: &CourseOutline,
) -> Result<Option<CourseGenerationInput>, E>
where
    E: From<JobStoreError> + From<ContentStoreError>,
{
    if let Some(job_id) = outline.generated_by {
        let input_id = jobs
            .get(tenant_id, job_id)
            .await?
            .and_then(|job| job.generation_input_id);
        if let Some(input_id) = input_id {
            if let Some(input) = content.get_generation_input(tenant_id, input_id).await? {
                return Ok(Some(input));
            }
        }
    }
    Ok(content
        .latest_generation_input(tenant_id, outline.course_id)
        .await?)
}

use tokio_postgres::Row;
use tracing::instrument;

use crate::application::Application;
use crate::db::util::query_opt_cached;
use crate::db::PgPool;
use crate::store::StoreError;

fn row_to_application(row: &Row) -> Result<Application, StoreError> {
    Ok(Application {
        id: row.try_get("id")?,
        org_id: row.try_get("org_id")?,
        candidate_name: row.try_get("candidate_name")?,
        interview_id: row.try_get("interview_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Touches `updated_at` even when no field changes.
#[instrument(skip(pool, candidate_name))]
pub async fn update_application(
    pool: &PgPool,
    org_id: &str,
    application_id: &str,
    candidate_name: Option<&str>,
) -> Result<Option<Application>, StoreError> {
    let client = pool.get().await?;
    let row = query_opt_cached(
        &client,
        "UPDATE iv.applications
         SET candidate_name = COALESCE($3, candidate_name),
             updated_at = NOW()
         WHERE id = $1 AND org_id = $2
         RETURNING id, org_id, candidate_name, interview_id, created_at, updated_at",
        &[&application_id, &org_id, &candidate_name],
        "applications.update",
    )
    .await?;

    row.as_ref().map(row_to_application).transpose()
}

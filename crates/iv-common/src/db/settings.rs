use tokio_postgres::Row;
use tracing::instrument;

use crate::db::util::{query_one_cached, query_opt_cached};
use crate::db::PgPool;
use crate::quota::ConcurrencyCap;
use crate::settings::{OrgSettings, SystemSettings};
use crate::store::StoreError;

fn row_to_org_settings(row: &Row) -> Result<OrgSettings, StoreError> {
    Ok(OrgSettings {
        org_id: row.try_get("org_id")?,
        default_duration_min: row.try_get("default_duration_min")?,
        default_expires_weeks: row.try_get("default_expires_weeks")?,
        default_expires_days: row.try_get("default_expires_days")?,
        default_expires_hours: row.try_get("default_expires_hours")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_system_settings(row: &Row) -> Result<SystemSettings, StoreError> {
    Ok(SystemSettings {
        default_duration_min: row.try_get("default_duration_min")?,
        default_expires_weeks: row.try_get("default_expires_weeks")?,
        default_expires_days: row.try_get("default_expires_days")?,
        default_expires_hours: row.try_get("default_expires_hours")?,
        max_concurrent_interviews: row.try_get("max_concurrent_interviews")?,
    })
}

#[instrument(skip(pool))]
pub async fn system_settings(pool: &PgPool) -> Result<Option<SystemSettings>, StoreError> {
    let client = pool.get().await?;
    let row = query_opt_cached(
        &client,
        "SELECT default_duration_min, default_expires_weeks, default_expires_days,
                default_expires_hours, max_concurrent_interviews
         FROM iv.system_settings WHERE id = 1",
        &[],
        "settings.system",
    )
    .await?;

    row.as_ref().map(row_to_system_settings).transpose()
}

/// The table holds at most one row, pinned to `id = 1`.
#[instrument(skip(pool, settings))]
pub async fn upsert_system_settings(
    pool: &PgPool,
    settings: &SystemSettings,
) -> Result<SystemSettings, StoreError> {
    let client = pool.get().await?;
    let row = query_one_cached(
        &client,
        "INSERT INTO iv.system_settings (
            id, default_duration_min, default_expires_weeks, default_expires_days,
            default_expires_hours, max_concurrent_interviews, updated_at
         ) VALUES (1, $1, $2, $3, $4, $5, NOW())
         ON CONFLICT (id) DO UPDATE
         SET default_duration_min = EXCLUDED.default_duration_min,
             default_expires_weeks = EXCLUDED.default_expires_weeks,
             default_expires_days = EXCLUDED.default_expires_days,
             default_expires_hours = EXCLUDED.default_expires_hours,
             max_concurrent_interviews = EXCLUDED.max_concurrent_interviews,
             updated_at = NOW()
         RETURNING default_duration_min, default_expires_weeks, default_expires_days,
                   default_expires_hours, max_concurrent_interviews",
        &[
            &settings.default_duration_min,
            &settings.default_expires_weeks,
            &settings.default_expires_days,
            &settings.default_expires_hours,
            &settings.max_concurrent_interviews,
        ],
        "settings.upsert_system",
    )
    .await?;

    row_to_system_settings(&row)
}

#[instrument(skip(pool))]
pub async fn org_settings(pool: &PgPool, org_id: &str) -> Result<Option<OrgSettings>, StoreError> {
    let client = pool.get().await?;
    let row = query_opt_cached(
        &client,
        "SELECT org_id, default_duration_min, default_expires_weeks, default_expires_days,
                default_expires_hours, updated_at
         FROM iv.org_settings WHERE org_id = $1",
        &[&org_id],
        "settings.org",
    )
    .await?;

    row.as_ref().map(row_to_org_settings).transpose()
}

#[instrument(skip(pool, settings), fields(org_id = %settings.org_id))]
pub async fn upsert_org_settings(
    pool: &PgPool,
    settings: &OrgSettings,
) -> Result<OrgSettings, StoreError> {
    let client = pool.get().await?;
    let row = query_one_cached(
        &client,
        "INSERT INTO iv.org_settings (
            org_id, default_duration_min, default_expires_weeks,
            default_expires_days, default_expires_hours, updated_at
         ) VALUES ($1, $2, $3, $4, $5, NOW())
         ON CONFLICT (org_id) DO UPDATE
         SET default_duration_min = EXCLUDED.default_duration_min,
             default_expires_weeks = EXCLUDED.default_expires_weeks,
             default_expires_days = EXCLUDED.default_expires_days,
             default_expires_hours = EXCLUDED.default_expires_hours,
             updated_at = NOW()
         RETURNING org_id, default_duration_min, default_expires_weeks,
                   default_expires_days, default_expires_hours, updated_at",
        &[
            &settings.org_id,
            &settings.default_duration_min,
            &settings.default_expires_weeks,
            &settings.default_expires_days,
            &settings.default_expires_hours,
        ],
        "settings.upsert_org",
    )
    .await?;

    row_to_org_settings(&row)
}

/// Subscription override and plan cap for an org, `None` without a subscription.
#[instrument(skip(pool))]
pub async fn concurrency_cap(
    pool: &PgPool,
    org_id: &str,
) -> Result<Option<ConcurrencyCap>, StoreError> {
    let client = pool.get().await?;
    let row = query_opt_cached(
        &client,
        "SELECT s.max_concurrent_override, p.max_concurrent_interviews AS plan_cap
         FROM iv.subscriptions s
         LEFT JOIN iv.plans p ON p.id = s.plan_id
         WHERE s.org_id = $1",
        &[&org_id],
        "settings.concurrency_cap",
    )
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(ConcurrencyCap {
        plan_cap: row.try_get("plan_cap")?,
        override_cap: row.try_get("max_concurrent_override")?,
    }))
}

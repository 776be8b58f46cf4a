use std::str::FromStr;

use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::instrument;

use crate::db::util::{execute_cached, query_cached, query_one_cached, query_opt_cached};
use crate::db::PgPool;
use crate::interview::{Decision, Interview, InterviewStatus, NewInterview};
use crate::store::{JoinClaim, StoreError};

const INTERVIEW_COLUMNS: &str = "id, public_token, org_id, room_name, candidate_identity, \
     candidate_name, prompt, opening_message, status, duration_sec, created_at, used_at, \
     recording_started_at, ended_at, expires_at, agent_dispatch_id, egress_id, \
     storage_object_key, decision, failure_reason";

fn parse_column<T: FromStr>(row: &Row, column: &str) -> Result<T, StoreError> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| StoreError::Mapping(format!("unexpected {column} value: {raw}")))
}

pub(crate) fn row_to_interview(row: &Row) -> Result<Interview, StoreError> {
    Ok(Interview {
        id: row.try_get("id")?,
        public_token: row.try_get("public_token")?,
        org_id: row.try_get("org_id")?,
        room_name: row.try_get("room_name")?,
        candidate_identity: row.try_get("candidate_identity")?,
        candidate_name: row.try_get("candidate_name")?,
        prompt: row.try_get("prompt")?,
        opening_message: row.try_get("opening_message")?,
        status: parse_column::<InterviewStatus>(row, "status")?,
        duration_sec: row.try_get("duration_sec")?,
        created_at: row.try_get("created_at")?,
        used_at: row.try_get("used_at")?,
        recording_started_at: row.try_get("recording_started_at")?,
        ended_at: row.try_get("ended_at")?,
        expires_at: row.try_get("expires_at")?,
        agent_dispatch_id: row.try_get("agent_dispatch_id")?,
        egress_id: row.try_get("egress_id")?,
        storage_object_key: row.try_get("storage_object_key")?,
        decision: parse_column::<Decision>(row, "decision")?,
        failure_reason: row.try_get("failure_reason")?,
    })
}

fn map_optional(row: Option<Row>) -> Result<Option<Interview>, StoreError> {
    row.as_ref().map(row_to_interview).transpose()
}

#[instrument(skip(pool, new), fields(interview_id = %new.id, org_id = %new.org_id))]
pub async fn insert_interview(pool: &PgPool, new: &NewInterview) -> Result<Interview, StoreError> {
    let client = pool.get().await?;
    let sql = format!(
        "INSERT INTO iv.interviews (
            id, public_token, org_id, room_name, candidate_identity, candidate_name,
            prompt, opening_message, status, duration_sec, created_at, expires_at
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'created', $9, $10, $11)
         RETURNING {INTERVIEW_COLUMNS}"
    );

    let row = query_one_cached(
        &client,
        &sql,
        &[
            &new.id,
            &new.public_token,
            &new.org_id,
            &new.room_name,
            &new.candidate_identity,
            &new.candidate_name,
            &new.prompt,
            &new.opening_message,
            &new.duration_sec,
            &new.created_at,
            &new.expires_at,
        ],
        "interviews.insert",
    )
    .await?;

    row_to_interview(&row)
}

#[instrument(skip(pool, token))]
pub async fn find_by_public_token(
    pool: &PgPool,
    token: &str,
) -> Result<Option<Interview>, StoreError> {
    let client = pool.get().await?;
    let sql = format!("SELECT {INTERVIEW_COLUMNS} FROM iv.interviews WHERE public_token = $1");
    let row = query_opt_cached(&client, &sql, &[&token], "interviews.by_token").await?;
    map_optional(row)
}

#[instrument(skip(pool))]
pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Interview>, StoreError> {
    let client = pool.get().await?;
    let sql = format!("SELECT {INTERVIEW_COLUMNS} FROM iv.interviews WHERE id = $1");
    let row = query_opt_cached(&client, &sql, &[&id], "interviews.by_id").await?;
    map_optional(row)
}

#[instrument(skip(pool))]
pub async fn list_interviews(
    pool: &PgPool,
    org_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Interview>, StoreError> {
    let client = pool.get().await?;
    let sql = format!(
        "SELECT {INTERVIEW_COLUMNS} FROM iv.interviews
         WHERE org_id = $1
         ORDER BY created_at DESC, id DESC
         LIMIT $2 OFFSET $3"
    );
    let rows = query_cached(&client, &sql, &[&org_id, &limit, &offset], "interviews.list").await?;
    rows.iter().map(row_to_interview).collect()
}

/// Lock the row, verify it is still `created`, then mark it `used` in the
/// same transaction. Concurrent callers serialize on the row lock and every
/// one after the first sees the updated status.
#[instrument(skip(pool))]
pub async fn claim_for_join(
    pool: &PgPool,
    id: &str,
    at: DateTime<Utc>,
) -> Result<JoinClaim, StoreError> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let Some(row) = query_opt_cached(
        &tx,
        "SELECT status FROM iv.interviews WHERE id = $1 FOR UPDATE",
        &[&id],
        "interviews.lock_for_join",
    )
    .await?
    else {
        return Ok(JoinClaim::NotFound);
    };

    let status = parse_column::<InterviewStatus>(&row, "status")?;
    if !status.can_transition_to(InterviewStatus::Used) {
        return Ok(JoinClaim::AlreadyUsed(status));
    }

    let sql = format!(
        "UPDATE iv.interviews SET status = 'used', used_at = $2
         WHERE id = $1
         RETURNING {INTERVIEW_COLUMNS}"
    );
    let row = query_one_cached(&tx, &sql, &[&id, &at], "interviews.claim_for_join").await?;
    let interview = row_to_interview(&row)?;
    tx.commit().await?;

    Ok(JoinClaim::Claimed(interview))
}

#[instrument(skip(pool))]
pub async fn record_dispatch(pool: &PgPool, id: &str, dispatch_id: &str) -> Result<(), StoreError> {
    let client = pool.get().await?;
    execute_cached(
        &client,
        "UPDATE iv.interviews SET agent_dispatch_id = $2 WHERE id = $1",
        &[&id, &dispatch_id],
        "interviews.record_dispatch",
    )
    .await?;
    Ok(())
}

/// Reserve the recording slot by writing the object key while the row is
/// `used` with no egress yet. Exactly one concurrent caller gets `true`.
#[instrument(skip(pool))]
pub async fn claim_recording(pool: &PgPool, id: &str, object_key: &str) -> Result<bool, StoreError> {
    let client = pool.get().await?;
    let sql = format!(
        "UPDATE iv.interviews SET storage_object_key = $2
         WHERE id = $1 AND {}
           AND egress_id IS NULL AND storage_object_key IS NULL",
        transition_guard(InterviewStatus::Recording)
    );
    let updated = execute_cached(
        &client,
        &sql,
        &[&id, &object_key],
        "interviews.claim_recording",
    )
    .await?;
    Ok(updated == 1)
}

/// Undo [`claim_recording`] after the egress failed to start.
#[instrument(skip(pool))]
pub async fn release_recording(pool: &PgPool, id: &str) -> Result<(), StoreError> {
    let client = pool.get().await?;
    execute_cached(
        &client,
        "UPDATE iv.interviews SET storage_object_key = NULL
         WHERE id = $1 AND egress_id IS NULL",
        &[&id],
        "interviews.release_recording",
    )
    .await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn record_egress(pool: &PgPool, id: &str, egress_id: &str) -> Result<(), StoreError> {
    let client = pool.get().await?;
    execute_cached(
        &client,
        "UPDATE iv.interviews SET egress_id = $2 WHERE id = $1",
        &[&id, &egress_id],
        "interviews.record_egress",
    )
    .await?;
    Ok(())
}

/// Shared shape of every status-guarded update: apply `set` only when the
/// row currently satisfies `guard`, returning the updated row.
async fn guarded_update(
    pool: &PgPool,
    id: &str,
    set: &str,
    guard: &str,
    extra: Option<&(dyn tokio_postgres::types::ToSql + Sync)>,
    label: &str,
) -> Result<Option<Interview>, StoreError> {
    let client = pool.get().await?;
    let sql = format!(
        "UPDATE iv.interviews SET {set}
         WHERE id = $1 AND {guard}
         RETURNING {INTERVIEW_COLUMNS}"
    );
    let row = match extra {
        Some(value) => query_opt_cached(&client, &sql, &[&id, value], label).await?,
        None => query_opt_cached(&client, &sql, &[&id], label).await?,
    };
    map_optional(row)
}

/// `status IN (...)` over every status allowed to move to `next`.
pub(crate) fn transition_guard(next: InterviewStatus) -> String {
    let allowed = InterviewStatus::predecessors(next)
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("status IN ({allowed})")
}

#[instrument(skip(pool))]
pub async fn mark_recording(
    pool: &PgPool,
    id: &str,
    at: DateTime<Utc>,
) -> Result<Option<Interview>, StoreError> {
    guarded_update(
        pool,
        id,
        "status = 'recording', recording_started_at = COALESCE(recording_started_at, $2)",
        &transition_guard(InterviewStatus::Recording),
        Some(&at),
        "interviews.mark_recording",
    )
    .await
}

#[instrument(skip(pool))]
pub async fn mark_ending(pool: &PgPool, id: &str) -> Result<Option<Interview>, StoreError> {
    guarded_update(
        pool,
        id,
        "status = 'ending'",
        &transition_guard(InterviewStatus::Ending),
        None,
        "interviews.mark_ending",
    )
    .await
}

#[instrument(skip(pool))]
pub async fn mark_completed(
    pool: &PgPool,
    id: &str,
    at: DateTime<Utc>,
) -> Result<Option<Interview>, StoreError> {
    guarded_update(
        pool,
        id,
        "status = 'completed', ended_at = $2",
        &transition_guard(InterviewStatus::Completed),
        Some(&at),
        "interviews.mark_completed",
    )
    .await
}

#[instrument(skip(pool))]
pub async fn mark_failed(
    pool: &PgPool,
    id: &str,
    reason: &str,
) -> Result<Option<Interview>, StoreError> {
    guarded_update(
        pool,
        id,
        "status = 'failed', failure_reason = $2",
        &transition_guard(InterviewStatus::Failed),
        Some(&reason),
        "interviews.mark_failed",
    )
    .await
}

#[instrument(skip(pool))]
pub async fn set_decision(
    pool: &PgPool,
    org_id: &str,
    id: &str,
    decision: Decision,
) -> Result<Option<Interview>, StoreError> {
    let client = pool.get().await?;
    let sql = format!(
        "UPDATE iv.interviews SET decision = $3
         WHERE id = $1 AND org_id = $2
         RETURNING {INTERVIEW_COLUMNS}"
    );
    let row = query_opt_cached(
        &client,
        &sql,
        &[&id, &org_id, &decision.as_str()],
        "interviews.set_decision",
    )
    .await?;
    map_optional(row)
}

#[instrument(skip(pool))]
pub async fn count_active(pool: &PgPool, org_id: Option<&str>) -> Result<i64, StoreError> {
    let client = pool.get().await?;
    let row = query_one_cached(
        &client,
        "SELECT COUNT(*) AS active FROM iv.interviews
         WHERE status IN ('used', 'recording', 'ending')
           AND ($1::text IS NULL OR org_id = $1)",
        &[&org_id],
        "interviews.count_active",
    )
    .await?;
    Ok(row.try_get("active")?)
}

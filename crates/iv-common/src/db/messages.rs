use tokio_postgres::Row;
use tracing::instrument;

use crate::db::util::{execute_cached, query_cached};
use crate::db::PgPool;
use crate::store::StoreError;
use crate::transcript::{InterviewMessage, NewMessage};

fn row_to_message(row: &Row) -> Result<InterviewMessage, StoreError> {
    let role: String = row.try_get("role")?;
    Ok(InterviewMessage {
        message_id: row.try_get("message_id")?,
        interview_id: row.try_get("interview_id")?,
        role: role
            .parse()
            .map_err(|_| StoreError::Mapping(format!("unexpected role value: {role}")))?,
        text: row.try_get("text")?,
        offset_ms: row.try_get("offset_ms")?,
        created_at: row.try_get("created_at")?,
    })
}

/// First write wins; a repeated `message_id` affects no rows.
#[instrument(skip(pool, message), fields(message_id = %message.message_id))]
pub async fn insert_message(pool: &PgPool, message: &NewMessage) -> Result<bool, StoreError> {
    let client = pool.get().await?;
    let inserted = execute_cached(
        &client,
        "INSERT INTO iv.interview_messages (
            message_id, interview_id, role, text, offset_ms, created_at
         ) VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (message_id) DO NOTHING",
        &[
            &message.message_id,
            &message.interview_id,
            &message.role.as_str(),
            &message.text,
            &message.offset_ms,
            &message.created_at,
        ],
        "messages.insert",
    )
    .await?;

    Ok(inserted == 1)
}

#[instrument(skip(pool))]
pub async fn list_messages(
    pool: &PgPool,
    interview_id: &str,
) -> Result<Vec<InterviewMessage>, StoreError> {
    let client = pool.get().await?;
    let rows = query_cached(
        &client,
        "SELECT message_id, interview_id, role, text, offset_ms, created_at
         FROM iv.interview_messages
         WHERE interview_id = $1
         ORDER BY offset_ms ASC, created_at ASC",
        &[&interview_id],
        "messages.list",
    )
    .await?;

    rows.iter().map(row_to_message).collect()
}

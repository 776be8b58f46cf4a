use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use thiserror::Error;
use tracing::{debug, instrument};
use ulid::Ulid;

use crate::interview::{truncate_chars, Interview};
use crate::store::{resolve_interview, InterviewStore, StoreError};

pub const MAX_MESSAGE_CHARS: usize = 2000;
pub const MAX_MESSAGE_ID_CHARS: usize = 128;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageRole {
    Interviewer,
    Candidate,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::Interviewer => "interviewer",
            MessageRole::Candidate => "candidate",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InterviewMessage {
    pub message_id: String,
    pub interview_id: String,
    pub role: MessageRole,
    pub text: String,
    pub offset_ms: i64,
    pub created_at: DateTime<Utc>,
}

pub type NewMessage = InterviewMessage;

#[derive(Debug, Clone, Default)]
pub struct IngestInput {
    pub role: Option<MessageRole>,
    pub text: String,
    pub message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("interview not found")]
    InterviewNotFound,
    #[error("message text is empty")]
    TextRequired,
    #[error("message id is too long")]
    MessageIdTooLong,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub message_id: String,
    pub created: bool,
    pub offset_ms: i64,
}

/// Milliseconds since `anchor`, floored at zero.
pub fn offset_ms(anchor: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - anchor).num_milliseconds().max(0)
}

pub fn prepare_message(
    interview: &Interview,
    input: IngestInput,
    now: DateTime<Utc>,
) -> Result<NewMessage, IngestError> {
    let text = input.text.trim();
    if text.is_empty() {
        return Err(IngestError::TextRequired);
    }

    let message_id = match input.message_id.as_deref().map(str::trim) {
        Some(id) if id.chars().count() > MAX_MESSAGE_ID_CHARS => {
            return Err(IngestError::MessageIdTooLong);
        }
        Some(id) if !id.is_empty() => id.to_string(),
        _ => Ulid::new().to_string(),
    };

    Ok(NewMessage {
        message_id,
        interview_id: interview.id.clone(),
        role: input.role.unwrap_or(MessageRole::Candidate),
        text: truncate_chars(text, MAX_MESSAGE_CHARS),
        offset_ms: offset_ms(interview.transcript_anchor(), now),
        created_at: now,
    })
}

/// Store one utterance. Redelivery of a known message id leaves the first
/// stored row untouched and reports `created: false`.
#[instrument(skip(store, input))]
pub async fn ingest(
    store: &dyn InterviewStore,
    key: &str,
    input: IngestInput,
    now: DateTime<Utc>,
) -> Result<IngestOutcome, IngestError> {
    let interview = resolve_interview(store, key)
        .await?
        .ok_or(IngestError::InterviewNotFound)?;

    let message = prepare_message(&interview, input, now)?;
    let created = store.insert_message(&message).await?;

    let result = if created { "created" } else { "duplicate" };
    metrics::counter!("iv_messages_ingested_total", "result" => result).increment(1);
    debug!(
        interview_id = %interview.id,
        message_id = %message.message_id,
        result,
        "transcript message ingested"
    );

    Ok(IngestOutcome {
        message_id: message.message_id,
        created,
        offset_ms: message.offset_ms,
    })
}

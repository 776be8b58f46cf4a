//! Public routes driven by the candidate's browser and the interviewer agent.
//!
//! Callers identify the interview by public token; the legacy internal id is
//! still accepted through the same resolver.

use std::str::FromStr;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use iv_common::interview::{InterviewStatus, MAX_LOOKUP_KEY_CHARS};
use iv_common::lifecycle::{BlockedScope, JoinGrant, TeardownReport};
use iv_common::transcript::{self, IngestInput, IngestOutcome, MessageRole};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::SharedState;

const CONCURRENCY_LIMIT: &str = "CONCURRENCY_LIMIT";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub public_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewKey {
    pub public_token: Option<String>,
    pub interview_id: Option<String>,
}

impl InterviewKey {
    /// Public token wins when both are sent.
    fn lookup(&self) -> Result<&str, ApiError> {
        let key = [self.public_token.as_deref(), self.interview_id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .ok_or(ApiError::BadRequest("INTERVIEW_ID_REQUIRED"))?;

        if key.chars().count() > MAX_LOOKUP_KEY_CHARS {
            return Err(ApiError::BadRequest("INTERVIEW_ID_TOO_LONG"));
        }

        Ok(key)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub text: Option<String>,
    pub role: Option<String>,
    pub message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    #[serde(flatten)]
    pub key: InterviewKey,
    pub message: Option<MessageBody>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: InterviewStatus,
    pub candidate_name: String,
    pub duration_sec: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_scope: Option<BlockedScope>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingResponse {
    pub status: InterviewStatus,
    pub recording_started_at: Option<DateTime<Utc>>,
    pub storage_object_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndResponse {
    pub status: InterviewStatus,
    pub ended_at: Option<DateTime<Utc>>,
    pub storage_object_key: Option<String>,
    /// Absent when the interview had already completed.
    pub teardown: Option<TeardownReport>,
}

pub async fn status(
    State(state): State<SharedState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let token = query
        .public_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::BadRequest("PUBLIC_TOKEN_REQUIRED"))?;
    if token.chars().count() > MAX_LOOKUP_KEY_CHARS {
        return Err(ApiError::BadRequest("PUBLIC_TOKEN_TOO_LONG"));
    }

    let report = state
        .lifecycle
        .status(token, state.config.default_max_concurrent, Utc::now())
        .await?;

    Ok(Json(StatusResponse {
        status: report.status,
        candidate_name: report.candidate_name,
        duration_sec: report.duration_sec,
        blocked_reason: report.blocked.map(|_| CONCURRENCY_LIMIT),
        blocked_scope: report.blocked.map(BlockedScope::from),
    }))
}

pub async fn join(
    State(state): State<SharedState>,
    JsonBody(payload): JsonBody<InterviewKey>,
) -> Result<Json<JoinGrant>, ApiError> {
    let key = payload.lookup()?;
    let grant = state.lifecycle.join(key, Utc::now()).await?;
    Ok(Json(grant))
}

pub async fn ingest_message(
    State(state): State<SharedState>,
    JsonBody(payload): JsonBody<MessageRequest>,
) -> Result<Json<IngestOutcome>, ApiError> {
    let key = payload.key.lookup()?;
    let message = payload.message.unwrap_or_default();

    let role = match message.role.as_deref().map(str::trim) {
        Some(role) if !role.is_empty() => Some(
            MessageRole::from_str(&role.to_ascii_lowercase())
                .map_err(|_| ApiError::BadRequest("ROLE_INVALID"))?,
        ),
        _ => None,
    };

    let input = IngestInput {
        role,
        text: message.text.unwrap_or_default(),
        message_id: message.message_id,
    };

    let outcome = transcript::ingest(state.store.as_ref(), key, input, Utc::now()).await?;
    Ok(Json(outcome))
}

pub async fn recording_start(
    State(state): State<SharedState>,
    JsonBody(payload): JsonBody<InterviewKey>,
) -> Result<Json<RecordingResponse>, ApiError> {
    let key = payload.lookup()?;
    let interview = state.lifecycle.recording_started(key, Utc::now()).await?;

    Ok(Json(RecordingResponse {
        status: interview.status,
        recording_started_at: interview.recording_started_at,
        storage_object_key: interview.storage_object_key,
    }))
}

pub async fn end(
    State(state): State<SharedState>,
    JsonBody(payload): JsonBody<InterviewKey>,
) -> Result<Json<EndResponse>, ApiError> {
    let key = payload.lookup()?;
    let outcome = state.lifecycle.end(key, Utc::now()).await?;

    Ok(Json(EndResponse {
        status: outcome.interview.status,
        ended_at: outcome.interview.ended_at,
        storage_object_key: outcome.interview.storage_object_key,
        teardown: outcome.teardown,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(public_token: Option<&str>, interview_id: Option<&str>) -> InterviewKey {
        InterviewKey {
            public_token: public_token.map(str::to_string),
            interview_id: interview_id.map(str::to_string),
        }
    }

    #[test]
    fn lookup_prefers_public_token() {
        assert_eq!(key(Some("tok"), Some("id")).lookup().unwrap(), "tok");
        assert_eq!(key(Some("  "), Some(" id ")).lookup().unwrap(), "id");
        assert_eq!(key(None, Some("id")).lookup().unwrap(), "id");
    }

    #[test]
    fn lookup_rejects_missing_and_oversized_keys() {
        assert_eq!(
            key(None, None).lookup().unwrap_err().code(),
            "INTERVIEW_ID_REQUIRED"
        );
        let long = "x".repeat(MAX_LOOKUP_KEY_CHARS + 1);
        assert_eq!(
            key(Some(&long), None).lookup().unwrap_err().code(),
            "INTERVIEW_ID_TOO_LONG"
        );
    }

    #[test]
    fn message_request_accepts_flattened_key() {
        let request: MessageRequest = serde_json::from_str(
            r#"{"publicToken":"tok","message":{"text":"hi","role":"interviewer","messageId":"m1"}}"#,
        )
        .unwrap();
        assert_eq!(request.key.lookup().unwrap(), "tok");
        let message = request.message.unwrap();
        assert_eq!(message.role.as_deref(), Some("interviewer"));
        assert_eq!(message.message_id.as_deref(), Some("m1"));
    }
}

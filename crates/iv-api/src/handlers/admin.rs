use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use iv_common::interview::{Decision, Interview, ScheduleInput};
use iv_common::settings::load_effective;
use iv_common::store::find_for_org;
use iv_common::transcript::InterviewMessage;
use serde::{Deserialize, Serialize};

use super::pagination::PageQuery;
use crate::auth::OrgContext;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInterviewRequest {
    pub duration_sec: Option<i64>,
    pub candidate_name: Option<String>,
    pub prompt: Option<String>,
    pub opening_message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInterviewResponse {
    pub interview_id: String,
    pub public_token: String,
    pub room_name: String,
    pub url: String,
    pub candidate_name: String,
    pub expires_at: DateTime<Utc>,
    pub duration_sec: i32,
}

#[derive(Debug, Serialize)]
pub struct InterviewList {
    pub items: Vec<Interview>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptResponse {
    pub interview_id: String,
    pub messages: Vec<InterviewMessage>,
}

pub async fn create_interview(
    State(state): State<SharedState>,
    org: OrgContext,
    JsonBody(payload): JsonBody<CreateInterviewRequest>,
) -> Result<(StatusCode, Json<CreateInterviewResponse>), ApiError> {
    let settings = load_effective(
        state.store.as_ref(),
        Some(&org.org_id),
        state.config.default_max_concurrent,
    )
    .await?;

    let input = ScheduleInput {
        duration_sec: payload.duration_sec,
        candidate_name: payload.candidate_name,
        prompt: payload.prompt,
        opening_message: payload.opening_message,
    };

    let interview = state
        .lifecycle
        .schedule(&org.org_id, input, &settings, Utc::now())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateInterviewResponse {
            url: state.config.interview_url(&interview.public_token),
            interview_id: interview.id,
            public_token: interview.public_token,
            room_name: interview.room_name,
            candidate_name: interview.candidate_name,
            expires_at: interview.expires_at,
            duration_sec: interview.duration_sec,
        }),
    ))
}

pub async fn list_interviews(
    State(state): State<SharedState>,
    org: OrgContext,
    Query(page): Query<PageQuery>,
) -> Result<Json<InterviewList>, ApiError> {
    let (limit, offset) = page.resolve()?;
    let items = state
        .store
        .list_interviews(&org.org_id, limit, offset)
        .await?;

    Ok(Json(InterviewList {
        items,
        limit,
        offset,
    }))
}

async fn interview_for_org(
    state: &SharedState,
    org: &OrgContext,
    id: &str,
) -> Result<Interview, ApiError> {
    find_for_org(state.store.as_ref(), &org.org_id, id)
        .await?
        .ok_or(ApiError::NotFound("INTERVIEW_NOT_FOUND"))
}

pub async fn get_interview(
    State(state): State<SharedState>,
    org: OrgContext,
    Path(id): Path<String>,
) -> Result<Json<Interview>, ApiError> {
    interview_for_org(&state, &org, &id).await.map(Json)
}

pub async fn update_decision(
    State(state): State<SharedState>,
    org: OrgContext,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<DecisionRequest>,
) -> Result<Json<Interview>, ApiError> {
    let decision = payload
        .decision
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::BadRequest("DECISION_REQUIRED"))?;
    let decision =
        Decision::from_str(decision).map_err(|_| ApiError::BadRequest("DECISION_INVALID"))?;

    state
        .store
        .set_decision(&org.org_id, &id, decision)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("INTERVIEW_NOT_FOUND"))
}

pub async fn list_messages(
    State(state): State<SharedState>,
    org: OrgContext,
    Path(id): Path<String>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let interview = interview_for_org(&state, &org, &id).await?;
    let messages = state.store.list_messages(&interview.id).await?;

    Ok(Json(TranscriptResponse {
        interview_id: interview.id,
        messages,
    }))
}

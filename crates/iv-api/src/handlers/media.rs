//! Short-lived download links for recordings and their thumbnails.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{Duration, Utc};
use iv_common::storage::{thumbnail_key, ObjectStorage};
use iv_common::store::find_for_org;
use serde::Serialize;

use crate::auth::OrgContext;
use crate::error::ApiError;
use crate::SharedState;

pub const MEDIA_URL_TTL_SEC: i64 = 3600;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUrl {
    pub url: String,
    pub expires_in_sec: i64,
}

async fn recording_key(
    state: &SharedState,
    org: &OrgContext,
    id: &str,
) -> Result<(ObjectStorage, String), ApiError> {
    let interview = find_for_org(state.store.as_ref(), &org.org_id, id)
        .await?
        .ok_or(ApiError::NotFound("INTERVIEW_NOT_FOUND"))?;

    let object_key = interview
        .storage_object_key
        .filter(|key| !key.is_empty())
        .ok_or(ApiError::NotFound("RECORDING_NOT_FOUND"))?;

    let storage = state
        .storage
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("recording storage not configured".into()))?;

    Ok((storage, object_key))
}

fn presign(storage: &ObjectStorage, object_key: &str) -> Result<MediaUrl, ApiError> {
    let url = storage.presign_get(
        object_key,
        Duration::seconds(MEDIA_URL_TTL_SEC),
        Utc::now(),
    )?;

    Ok(MediaUrl {
        url,
        expires_in_sec: MEDIA_URL_TTL_SEC,
    })
}

pub async fn video_url(
    State(state): State<SharedState>,
    org: OrgContext,
    Path(id): Path<String>,
) -> Result<Json<MediaUrl>, ApiError> {
    let (storage, object_key) = recording_key(&state, &org, &id).await?;
    presign(&storage, &object_key).map(Json)
}

pub async fn thumbnail_url(
    State(state): State<SharedState>,
    org: OrgContext,
    Path(id): Path<String>,
) -> Result<Json<MediaUrl>, ApiError> {
    let (storage, object_key) = recording_key(&state, &org, &id).await?;
    presign(&storage, &thumbnail_key(&object_key)).map(Json)
}

use axum::{extract::State, Json};
use iv_common::settings::{org_settings_or_default, OrgSettings, SettingsPatch};
use tracing::info;

use crate::auth::OrgContext;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::SharedState;

pub async fn get_settings(
    State(state): State<SharedState>,
    org: OrgContext,
) -> Result<Json<OrgSettings>, ApiError> {
    let settings = org_settings_or_default(state.store.as_ref(), &org.org_id).await?;
    Ok(Json(settings))
}

/// Out-of-range values are clamped rather than rejected.
pub async fn update_settings(
    State(state): State<SharedState>,
    org: OrgContext,
    JsonBody(patch): JsonBody<SettingsPatch>,
) -> Result<Json<OrgSettings>, ApiError> {
    let current = org_settings_or_default(state.store.as_ref(), &org.org_id).await?;
    let next = patch.apply(&current);

    let saved = state.store.upsert_org_settings(&next).await?;
    info!(
        org_id = %saved.org_id,
        subject = %org.subject,
        default_duration_min = saved.default_duration_min,
        "org settings updated"
    );
    Ok(Json(saved))
}

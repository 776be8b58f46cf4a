use axum::{extract::State, Json};
use iv_common::application::{Application, ApplicationUpdateRequest};

use crate::auth::OrgContext;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::SharedState;

pub async fn update_application(
    State(state): State<SharedState>,
    org: OrgContext,
    JsonBody(payload): JsonBody<ApplicationUpdateRequest>,
) -> Result<Json<Application>, ApiError> {
    let update = payload.validate()?;

    state
        .store
        .update_application(
            &org.org_id,
            &update.application_id,
            update.candidate_name.as_deref(),
        )
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("APPLICATION_NOT_FOUND"))
}

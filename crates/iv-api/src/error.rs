use axum::extract::rejection::JsonRejection;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::future::Future;
use thiserror::Error;
use tracing::{error, warn};

use iv_common::application::ApplicationUpdateError;
use iv_common::interview::ScheduleError;
use iv_common::lifecycle::LifecycleError;
use iv_common::storage::StorageSignError;
use iv_common::store::StoreError;
use iv_common::transcript::IngestError;

tokio::task_local! {
    static REQUEST_ID: String;
}

pub async fn with_request_id<Fut, T>(request_id: Option<String>, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    if let Some(request_id) = request_id {
        REQUEST_ID.scope(request_id, fut).await
    } else {
        fut.await
    }
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|value| value.clone()).ok()
}

/// Every variant except the startup/infrastructure ones carries the
/// machine-readable code returned in the `error` field.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    #[error("payload too large: {0}")]
    PayloadTooLarge(&'static str),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(&'static str),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("gone: {0}")]
    Gone(&'static str),
    #[error("too many requests: {0}")]
    TooManyRequests(String),
    #[error("upstream failure {code}: {detail}")]
    BadGateway { code: &'static str, detail: String },
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: &'static str,
    request_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let code = self.code();
        let request_id = current_request_id();

        if status.is_server_error() {
            error!(
                code,
                status = %status,
                request_id = request_id.as_deref().unwrap_or(""),
                error = %self,
                "api_error"
            );
        } else {
            warn!(
                code,
                status = %status,
                request_id = request_id.as_deref().unwrap_or(""),
                "api_error"
            );
        }

        let body = Json(ErrorResponse {
            error: code,
            request_id,
        });

        (status, body).into_response()
    }
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(code)
            | ApiError::NotFound(code)
            | ApiError::Conflict(code)
            | ApiError::Gone(code)
            | ApiError::PayloadTooLarge(code)
            | ApiError::UnsupportedMediaType(code) => code,
            ApiError::BadGateway { code, .. } => code,
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::TooManyRequests(_) => "RATE_LIMITED",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Database(_) | ApiError::Config(_) | ApiError::Internal(_) => {
                "INTERNAL_ERROR"
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) | ApiError::Config(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        match value {
            JsonRejection::MissingJsonContentType(_) => {
                ApiError::UnsupportedMediaType("JSON_CONTENT_TYPE_REQUIRED")
            }
            JsonRejection::BytesRejection(inner)
                if inner.status() == StatusCode::PAYLOAD_TOO_LARGE =>
            {
                ApiError::PayloadTooLarge("BODY_TOO_LARGE")
            }
            JsonRejection::BytesRejection(_) => ApiError::BadRequest("BODY_UNREADABLE"),
            _ => ApiError::BadRequest("INVALID_BODY"),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        ApiError::Database(value.to_string())
    }
}

impl From<ScheduleError> for ApiError {
    fn from(value: ScheduleError) -> Self {
        match value {
            ScheduleError::CandidateNameTooLong => ApiError::BadRequest("CANDIDATE_NAME_TOO_LONG"),
            ScheduleError::OpeningMessageTooLong => {
                ApiError::BadRequest("OPENING_MESSAGE_TOO_LONG")
            }
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(value: LifecycleError) -> Self {
        match value {
            LifecycleError::NotFound => ApiError::NotFound("INTERVIEW_NOT_FOUND"),
            LifecycleError::Expired => ApiError::Gone("INTERVIEW_EXPIRED"),
            LifecycleError::AlreadyUsed(_) => ApiError::Conflict("INTERVIEW_ALREADY_USED"),
            LifecycleError::NotStarted => ApiError::Conflict("INTERVIEW_NOT_STARTED"),
            LifecycleError::Failed => ApiError::Conflict("INTERVIEW_FAILED"),
            LifecycleError::Schedule(err) => err.into(),
            LifecycleError::AgentDispatch(err) => ApiError::BadGateway {
                code: "AGENT_DISPATCH_FAILED",
                detail: err.to_string(),
            },
            LifecycleError::RecordingStart(err) => ApiError::BadGateway {
                code: "RECORDING_START_FAILED",
                detail: err.to_string(),
            },
            LifecycleError::Credential(err) => ApiError::Internal(err.to_string()),
            LifecycleError::Store(err) => err.into(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(value: IngestError) -> Self {
        match value {
            IngestError::InterviewNotFound => ApiError::NotFound("INTERVIEW_NOT_FOUND"),
            IngestError::TextRequired => ApiError::BadRequest("TEXT_REQUIRED"),
            IngestError::MessageIdTooLong => ApiError::BadRequest("MESSAGE_ID_TOO_LONG"),
            IngestError::Store(err) => err.into(),
        }
    }
}

impl From<ApplicationUpdateError> for ApiError {
    fn from(value: ApplicationUpdateError) -> Self {
        match value {
            ApplicationUpdateError::MissingApplicationId => {
                ApiError::BadRequest("APPLICATION_ID_REQUIRED")
            }
            ApplicationUpdateError::ApplicationIdTooLong => {
                ApiError::BadRequest("APPLICATION_ID_TOO_LONG")
            }
            ApplicationUpdateError::CandidateNameTooLong => {
                ApiError::BadRequest("CANDIDATE_NAME_TOO_LONG")
            }
        }
    }
}

impl From<StorageSignError> for ApiError {
    fn from(value: StorageSignError) -> Self {
        match value {
            StorageSignError::EmptyKey => ApiError::NotFound("RECORDING_NOT_FOUND"),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use iv_common::interview::InterviewStatus;
    use serde_json::Value;

    use super::*;

    async fn body_json(response: axum::response::Response) -> (StatusCode, Value) {
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        (parts.status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn includes_request_id_in_response_body_when_present() {
        let err = ApiError::Internal("boom".into());
        let response = with_request_id(Some("req-123".into()), async { err.into_response() }).await;

        let (status, json) = body_json(response).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "INTERNAL_ERROR");
        assert_eq!(json["requestId"], "req-123");
    }

    #[tokio::test]
    async fn lifecycle_errors_keep_their_codes() {
        let (status, json) =
            body_json(ApiError::from(LifecycleError::AlreadyUsed(InterviewStatus::Used)).into_response())
                .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "INTERVIEW_ALREADY_USED");

        let (status, json) = body_json(ApiError::from(LifecycleError::Expired).into_response()).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(json["error"], "INTERVIEW_EXPIRED");
        assert!(json["requestId"].is_null());
    }

    #[test]
    fn internal_details_never_become_codes() {
        let err = ApiError::Database("relation iv.interviews does not exist".into());
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

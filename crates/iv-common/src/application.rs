use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interview::MAX_CANDIDATE_NAME_CHARS;

pub const MAX_APPLICATION_ID_CHARS: usize = 128;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub org_id: String,
    pub candidate_name: Option<String>,
    pub interview_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationUpdateRequest {
    pub application_id: Option<String>,
    pub candidate_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplicationUpdateError {
    #[error("application id is required")]
    MissingApplicationId,
    #[error("application id is too long")]
    ApplicationIdTooLong,
    #[error("candidate name is too long")]
    CandidateNameTooLong,
}

/// Validated form of [`ApplicationUpdateRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationUpdate {
    pub application_id: String,
    pub candidate_name: Option<String>,
}

impl ApplicationUpdateRequest {
    pub fn validate(&self) -> Result<ApplicationUpdate, ApplicationUpdateError> {
        let application_id = self
            .application_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ApplicationUpdateError::MissingApplicationId)?;

        if application_id.chars().count() > MAX_APPLICATION_ID_CHARS {
            return Err(ApplicationUpdateError::ApplicationIdTooLong);
        }

        let candidate_name = self.candidate_name.as_deref().map(str::trim);
        if candidate_name.is_some_and(|name| name.chars().count() > MAX_CANDIDATE_NAME_CHARS) {
            return Err(ApplicationUpdateError::CandidateNameTooLong);
        }

        Ok(ApplicationUpdate {
            application_id: application_id.to_string(),
            candidate_name: candidate_name.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_or_blank_application_id() {
        let request = ApplicationUpdateRequest::default();
        assert_eq!(
            request.validate(),
            Err(ApplicationUpdateError::MissingApplicationId)
        );

        let request = ApplicationUpdateRequest {
            application_id: Some("   ".into()),
            candidate_name: None,
        };
        assert_eq!(
            request.validate(),
            Err(ApplicationUpdateError::MissingApplicationId)
        );
    }

    #[test]
    fn rejects_oversized_fields() {
        let request = ApplicationUpdateRequest {
            application_id: Some("a".repeat(129)),
            candidate_name: None,
        };
        assert_eq!(
            request.validate(),
            Err(ApplicationUpdateError::ApplicationIdTooLong)
        );

        let request = ApplicationUpdateRequest {
            application_id: Some("app_1".into()),
            candidate_name: Some("名".repeat(81)),
        };
        assert_eq!(
            request.validate(),
            Err(ApplicationUpdateError::CandidateNameTooLong)
        );
    }

    #[test]
    fn trims_valid_input() {
        let request = ApplicationUpdateRequest {
            application_id: Some(" app_1 ".into()),
            candidate_name: Some(" 山田 太郎 ".into()),
        };
        let update = request.validate().unwrap();
        assert_eq!(update.application_id, "app_1");
        assert_eq!(update.candidate_name.as_deref(), Some("山田 太郎"));
    }
}

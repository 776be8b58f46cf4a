use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::application::Application;
use crate::db::db_error;
use crate::interview::{Decision, Interview, InterviewStatus, NewInterview};
use crate::quota::ConcurrencyCap;
use crate::settings::{OrgSettings, SystemSettings};
use crate::transcript::{InterviewMessage, NewMessage};

db_error!(StoreError {
    #[error("failed to map row: {0}")]
    Mapping(String),
});

/// Outcome of the transactional read-check-write performed by join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinClaim {
    Claimed(Interview),
    AlreadyUsed(InterviewStatus),
    NotFound,
}

/// Persistence gateway for every entity the service owns.
///
/// Conditional updates return `None` when the row is missing or its current
/// status does not permit the change; callers re-read to tell the two apart.
#[async_trait]
pub trait InterviewStore: Send + Sync + 'static {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_interview(&self, new: &NewInterview) -> Result<Interview, StoreError>;

    async fn find_by_public_token(&self, token: &str) -> Result<Option<Interview>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Interview>, StoreError>;

    async fn list_interviews(
        &self,
        org_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Interview>, StoreError>;

    /// Atomically move `created → used`. Only one concurrent caller may win.
    async fn claim_for_join(&self, id: &str, at: DateTime<Utc>) -> Result<JoinClaim, StoreError>;

    async fn record_dispatch(&self, id: &str, dispatch_id: &str) -> Result<(), StoreError>;

    /// Reserve the single recording slot of a `used` interview by storing its
    /// object key. `false` when another caller already holds it or the row
    /// has moved on.
    async fn claim_recording(&self, id: &str, object_key: &str) -> Result<bool, StoreError>;

    /// Drop an unfulfilled recording claim so a later call can retry.
    async fn release_recording(&self, id: &str) -> Result<(), StoreError>;

    async fn record_egress(&self, id: &str, egress_id: &str) -> Result<(), StoreError>;

    /// `used → recording`, stamping `recording_started_at` only when unset.
    async fn mark_recording(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Interview>, StoreError>;

    /// Any non-terminal status → `ending`.
    async fn mark_ending(&self, id: &str) -> Result<Option<Interview>, StoreError>;

    /// `ending → completed`, stamping `ended_at`.
    async fn mark_completed(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Interview>, StoreError>;

    /// Any non-terminal status → `failed`.
    async fn mark_failed(&self, id: &str, reason: &str) -> Result<Option<Interview>, StoreError>;

    async fn set_decision(
        &self,
        org_id: &str,
        id: &str,
        decision: Decision,
    ) -> Result<Option<Interview>, StoreError>;

    /// Interviews in the active status set, across all orgs when `org_id` is `None`.
    async fn count_active(&self, org_id: Option<&str>) -> Result<i64, StoreError>;

    async fn system_settings(&self) -> Result<Option<SystemSettings>, StoreError>;

    async fn org_settings(&self, org_id: &str) -> Result<Option<OrgSettings>, StoreError>;

    /// Write the singleton system row, creating it on first use.
    async fn upsert_system_settings(
        &self,
        settings: &SystemSettings,
    ) -> Result<SystemSettings, StoreError>;

    async fn upsert_org_settings(&self, settings: &OrgSettings) -> Result<OrgSettings, StoreError>;

    async fn concurrency_cap(&self, org_id: &str) -> Result<Option<ConcurrencyCap>, StoreError>;

    /// Returns `false` when the message id was already stored.
    async fn insert_message(&self, message: &NewMessage) -> Result<bool, StoreError>;

    async fn list_messages(&self, interview_id: &str) -> Result<Vec<InterviewMessage>, StoreError>;

    async fn update_application(
        &self,
        org_id: &str,
        application_id: &str,
        candidate_name: Option<&str>,
    ) -> Result<Option<Application>, StoreError>;
}

/// Look an interview up by public token, then by legacy internal id.
pub async fn resolve_interview(
    store: &dyn InterviewStore,
    key: &str,
) -> Result<Option<Interview>, StoreError> {
    if let Some(interview) = store.find_by_public_token(key).await? {
        return Ok(Some(interview));
    }

    store.find_by_id(key).await
}

/// Admin lookup scoped to the caller's organization.
pub async fn find_for_org(
    store: &dyn InterviewStore,
    org_id: &str,
    id: &str,
) -> Result<Option<Interview>, StoreError> {
    Ok(store
        .find_by_id(id)
        .await?
        .filter(|interview| interview.org_id == org_id))
}

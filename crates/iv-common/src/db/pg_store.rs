use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::application::Application;
use crate::db::{applications, interviews, messages, settings, PgPool};
use crate::interview::{Decision, Interview, NewInterview};
use crate::quota::ConcurrencyCap;
use crate::settings::{OrgSettings, SystemSettings};
use crate::store::{InterviewStore, JoinClaim, StoreError};
use crate::transcript::{InterviewMessage, NewMessage};

/// [`InterviewStore`] over a deadpool Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl InterviewStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn insert_interview(&self, new: &NewInterview) -> Result<Interview, StoreError> {
        interviews::insert_interview(&self.pool, new).await
    }

    async fn find_by_public_token(&self, token: &str) -> Result<Option<Interview>, StoreError> {
        interviews::find_by_public_token(&self.pool, token).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Interview>, StoreError> {
        interviews::find_by_id(&self.pool, id).await
    }

    async fn list_interviews(
        &self,
        org_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Interview>, StoreError> {
        interviews::list_interviews(&self.pool, org_id, limit, offset).await
    }

    async fn claim_for_join(&self, id: &str, at: DateTime<Utc>) -> Result<JoinClaim, StoreError> {
        interviews::claim_for_join(&self.pool, id, at).await
    }

    async fn record_dispatch(&self, id: &str, dispatch_id: &str) -> Result<(), StoreError> {
        interviews::record_dispatch(&self.pool, id, dispatch_id).await
    }

    async fn claim_recording(&self, id: &str, object_key: &str) -> Result<bool, StoreError> {
        interviews::claim_recording(&self.pool, id, object_key).await
    }

    async fn release_recording(&self, id: &str) -> Result<(), StoreError> {
        interviews::release_recording(&self.pool, id).await
    }

    async fn record_egress(&self, id: &str, egress_id: &str) -> Result<(), StoreError> {
        interviews::record_egress(&self.pool, id, egress_id).await
    }

    async fn mark_recording(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Interview>, StoreError> {
        interviews::mark_recording(&self.pool, id, at).await
    }

    async fn mark_ending(&self, id: &str) -> Result<Option<Interview>, StoreError> {
        interviews::mark_ending(&self.pool, id).await
    }

    async fn mark_completed(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Interview>, StoreError> {
        interviews::mark_completed(&self.pool, id, at).await
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<Option<Interview>, StoreError> {
        interviews::mark_failed(&self.pool, id, reason).await
    }

    async fn set_decision(
        &self,
        org_id: &str,
        id: &str,
        decision: Decision,
    ) -> Result<Option<Interview>, StoreError> {
        interviews::set_decision(&self.pool, org_id, id, decision).await
    }

    async fn count_active(&self, org_id: Option<&str>) -> Result<i64, StoreError> {
        interviews::count_active(&self.pool, org_id).await
    }

    async fn system_settings(&self) -> Result<Option<SystemSettings>, StoreError> {
        settings::system_settings(&self.pool).await
    }

    async fn org_settings(&self, org_id: &str) -> Result<Option<OrgSettings>, StoreError> {
        settings::org_settings(&self.pool, org_id).await
    }

    async fn upsert_system_settings(
        &self,
        value: &SystemSettings,
    ) -> Result<SystemSettings, StoreError> {
        settings::upsert_system_settings(&self.pool, value).await
    }

    async fn upsert_org_settings(&self, value: &OrgSettings) -> Result<OrgSettings, StoreError> {
        settings::upsert_org_settings(&self.pool, value).await
    }

    async fn concurrency_cap(&self, org_id: &str) -> Result<Option<ConcurrencyCap>, StoreError> {
        settings::concurrency_cap(&self.pool, org_id).await
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<bool, StoreError> {
        messages::insert_message(&self.pool, message).await
    }

    async fn list_messages(&self, interview_id: &str) -> Result<Vec<InterviewMessage>, StoreError> {
        messages::list_messages(&self.pool, interview_id).await
    }

    async fn update_application(
        &self,
        org_id: &str,
        application_id: &str,
        candidate_name: Option<&str>,
    ) -> Result<Option<Application>, StoreError> {
        applications::update_application(&self.pool, org_id, application_id, candidate_name).await
    }
}

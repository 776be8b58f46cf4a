//! In-process [`InterviewStore`] used by tests and local demos.
//!
//! Every operation runs under one mutex, which gives the join claim the same
//! single-winner guarantee the Postgres row lock provides.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::application::Application;
use crate::interview::{
    generate_public_token, Decision, Interview, InterviewStatus, NewInterview,
    DEFAULT_DURATION_SEC, DEFAULT_INTERVIEW_PROMPT,
};
use crate::quota::ConcurrencyCap;
use crate::settings::{OrgSettings, SystemSettings};
use crate::store::{InterviewStore, JoinClaim, StoreError};
use crate::transcript::{InterviewMessage, NewMessage};

#[derive(Default)]
struct Inner {
    interviews: Vec<Interview>,
    messages: Vec<InterviewMessage>,
    org_settings: HashMap<String, OrgSettings>,
    system_settings: Option<SystemSettings>,
    caps: HashMap<String, ConcurrencyCap>,
    applications: HashMap<String, Application>,
}

impl Inner {
    fn interview_mut(&mut self, id: &str) -> Option<&mut Interview> {
        self.interviews.iter_mut().find(|interview| interview.id == id)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// Makes `record_dispatch` fail, for exercising bookkeeping errors.
    pub fail_record_dispatch: AtomicBool,
}

/// A scheduled interview with timestamps consistent with `status`.
pub fn sample_interview(org_id: &str, status: InterviewStatus) -> Interview {
    let now = Utc::now();
    let id = ulid::Ulid::new().to_string();
    let started = !matches!(status, InterviewStatus::Created);

    Interview {
        room_name: format!("interview-{}", id.to_lowercase()),
        candidate_identity: format!("candidate-{}", id.to_lowercase()),
        id,
        public_token: generate_public_token(),
        org_id: org_id.to_string(),
        candidate_name: "候補者".to_string(),
        prompt: DEFAULT_INTERVIEW_PROMPT.to_string(),
        opening_message: None,
        status,
        duration_sec: DEFAULT_DURATION_SEC,
        created_at: now - Duration::minutes(10),
        used_at: started.then(|| now - Duration::minutes(5)),
        recording_started_at: None,
        ended_at: None,
        expires_at: now + Duration::weeks(1),
        agent_dispatch_id: None,
        egress_id: None,
        storage_object_key: None,
        decision: Decision::Undecided,
        failure_reason: None,
    }
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_raw(&self, interview: Interview) -> Interview {
        self.lock().interviews.push(interview.clone());
        interview
    }

    pub fn seed_interview(&self, org_id: &str, status: InterviewStatus) -> Interview {
        self.insert_raw(sample_interview(org_id, status))
    }

    pub fn snapshot(&self, id: &str) -> Option<Interview> {
        self.lock()
            .interviews
            .iter()
            .find(|interview| interview.id == id)
            .cloned()
    }

    pub fn set_concurrency_cap(&self, org_id: &str, cap: ConcurrencyCap) {
        self.lock().caps.insert(org_id.to_string(), cap);
    }

    pub fn set_system_settings(&self, settings: SystemSettings) {
        self.lock().system_settings = Some(settings);
    }

    pub fn seed_application(&self, org_id: &str, id: &str, candidate_name: Option<&str>) {
        let now = Utc::now();
        self.lock().applications.insert(
            id.to_string(),
            Application {
                id: id.to_string(),
                org_id: org_id.to_string(),
                candidate_name: candidate_name.map(str::to_string),
                interview_id: None,
                created_at: now,
                updated_at: now,
            },
        );
    }

    /// Move to `next` when the transition table allows it from the current status.
    fn transition(
        &self,
        id: &str,
        next: InterviewStatus,
        apply: impl FnOnce(&mut Interview),
    ) -> Option<Interview> {
        let mut inner = self.lock();
        let interview = inner.interview_mut(id)?;
        if !interview.status.can_transition_to(next) {
            return None;
        }
        interview.status = next;
        apply(interview);
        Some(interview.clone())
    }
}

#[async_trait]
impl InterviewStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_interview(&self, new: &NewInterview) -> Result<Interview, StoreError> {
        Ok(self.insert_raw(new.clone().into_interview()))
    }

    async fn find_by_public_token(&self, token: &str) -> Result<Option<Interview>, StoreError> {
        Ok(self
            .lock()
            .interviews
            .iter()
            .find(|interview| interview.public_token == token)
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Interview>, StoreError> {
        Ok(self.snapshot(id))
    }

    async fn list_interviews(
        &self,
        org_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Interview>, StoreError> {
        let mut rows = self
            .lock()
            .interviews
            .iter()
            .filter(|interview| interview.org_id == org_id)
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn claim_for_join(&self, id: &str, at: DateTime<Utc>) -> Result<JoinClaim, StoreError> {
        let mut inner = self.lock();
        let Some(interview) = inner.interview_mut(id) else {
            return Ok(JoinClaim::NotFound);
        };

        if !interview.status.can_transition_to(InterviewStatus::Used) {
            return Ok(JoinClaim::AlreadyUsed(interview.status));
        }

        interview.status = InterviewStatus::Used;
        interview.used_at = Some(at);
        Ok(JoinClaim::Claimed(interview.clone()))
    }

    async fn record_dispatch(&self, id: &str, dispatch_id: &str) -> Result<(), StoreError> {
        if self.fail_record_dispatch.load(Ordering::SeqCst) {
            return Err(StoreError::Mapping("record_dispatch unavailable".into()));
        }
        if let Some(interview) = self.lock().interview_mut(id) {
            interview.agent_dispatch_id = Some(dispatch_id.to_string());
        }
        Ok(())
    }

    async fn claim_recording(&self, id: &str, object_key: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(interview) = inner.interview_mut(id) else {
            return Ok(false);
        };
        if !interview.status.can_transition_to(InterviewStatus::Recording)
            || interview.egress_id.is_some()
            || interview.storage_object_key.is_some()
        {
            return Ok(false);
        }
        interview.storage_object_key = Some(object_key.to_string());
        Ok(true)
    }

    async fn release_recording(&self, id: &str) -> Result<(), StoreError> {
        if let Some(interview) = self.lock().interview_mut(id) {
            if interview.egress_id.is_none() {
                interview.storage_object_key = None;
            }
        }
        Ok(())
    }

    async fn record_egress(&self, id: &str, egress_id: &str) -> Result<(), StoreError> {
        if let Some(interview) = self.lock().interview_mut(id) {
            interview.egress_id = Some(egress_id.to_string());
        }
        Ok(())
    }

    async fn mark_recording(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Interview>, StoreError> {
        Ok(self.transition(id, InterviewStatus::Recording, |interview| {
            interview.recording_started_at.get_or_insert(at);
        }))
    }

    async fn mark_ending(&self, id: &str) -> Result<Option<Interview>, StoreError> {
        Ok(self.transition(id, InterviewStatus::Ending, |_| {}))
    }

    async fn mark_completed(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Interview>, StoreError> {
        Ok(self.transition(id, InterviewStatus::Completed, |interview| {
            interview.ended_at = Some(at);
        }))
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<Option<Interview>, StoreError> {
        Ok(self.transition(id, InterviewStatus::Failed, |interview| {
            interview.failure_reason = Some(reason.to_string());
        }))
    }

    async fn set_decision(
        &self,
        org_id: &str,
        id: &str,
        decision: Decision,
    ) -> Result<Option<Interview>, StoreError> {
        let mut inner = self.lock();
        let Some(interview) = inner.interview_mut(id) else {
            return Ok(None);
        };
        if interview.org_id != org_id {
            return Ok(None);
        }
        interview.decision = decision;
        Ok(Some(interview.clone()))
    }

    async fn count_active(&self, org_id: Option<&str>) -> Result<i64, StoreError> {
        Ok(self
            .lock()
            .interviews
            .iter()
            .filter(|interview| interview.status.is_active())
            .filter(|interview| org_id.map_or(true, |org| interview.org_id == org))
            .count() as i64)
    }

    async fn system_settings(&self) -> Result<Option<SystemSettings>, StoreError> {
        Ok(self.lock().system_settings.clone())
    }

    async fn org_settings(&self, org_id: &str) -> Result<Option<OrgSettings>, StoreError> {
        Ok(self.lock().org_settings.get(org_id).cloned())
    }

    async fn upsert_system_settings(
        &self,
        settings: &SystemSettings,
    ) -> Result<SystemSettings, StoreError> {
        self.lock().system_settings = Some(settings.clone());
        Ok(settings.clone())
    }

    async fn upsert_org_settings(&self, settings: &OrgSettings) -> Result<OrgSettings, StoreError> {
        let mut stored = settings.clone();
        stored.updated_at = Some(Utc::now());
        self.lock()
            .org_settings
            .insert(stored.org_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn concurrency_cap(&self, org_id: &str) -> Result<Option<ConcurrencyCap>, StoreError> {
        Ok(self.lock().caps.get(org_id).copied())
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner
            .messages
            .iter()
            .any(|existing| existing.message_id == message.message_id)
        {
            return Ok(false);
        }
        inner.messages.push(message.clone());
        Ok(true)
    }

    async fn list_messages(&self, interview_id: &str) -> Result<Vec<InterviewMessage>, StoreError> {
        let mut messages = self
            .lock()
            .messages
            .iter()
            .filter(|message| message.interview_id == interview_id)
            .cloned()
            .collect::<Vec<_>>();
        messages.sort_by(|a, b| {
            a.offset_ms
                .cmp(&b.offset_ms)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(messages)
    }

    async fn update_application(
        &self,
        org_id: &str,
        application_id: &str,
        candidate_name: Option<&str>,
    ) -> Result<Option<Application>, StoreError> {
        let mut inner = self.lock();
        let Some(application) = inner
            .applications
            .get_mut(application_id)
            .filter(|application| application.org_id == org_id)
        else {
            return Ok(None);
        };

        if let Some(name) = candidate_name {
            application.candidate_name = Some(name.to_string());
        }
        application.updated_at = Utc::now();
        Ok(Some(application.clone()))
    }
}

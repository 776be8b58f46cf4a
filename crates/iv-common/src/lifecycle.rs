//! Interview lifecycle: `created → used → recording → ending → completed`,
//! with `failed` reachable from every non-terminal state.
//!
//! Local status changes go through [`InterviewStore`]; the video provider is
//! called around them. Join is the only transition guarded by a row lock.
//! Teardown on end is best-effort and its outcome is reported, not raised.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::interview::{schedule_interview, Interview, InterviewStatus, ScheduleError, ScheduleInput};
use crate::quota::{self, BlockReason};
use crate::settings::{load_effective, EffectiveSettings};
use crate::store::{resolve_interview, InterviewStore, JoinClaim, StoreError};
use crate::video::{AccessTokenIssuer, AgentMetadata, VideoError, VideoGrant, VideoProvider};

pub const AGENT_DISPATCH_FAILED: &str = "AGENT_DISPATCH_FAILED";
pub const DEFAULT_AGENT_NAME: &str = "Sage-266e";

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("interview not found")]
    NotFound,
    #[error("interview link has expired")]
    Expired,
    #[error("interview already used (status {0:?})")]
    AlreadyUsed(InterviewStatus),
    #[error("interview has not been joined yet")]
    NotStarted,
    #[error("interview has failed")]
    Failed,
    #[error("invalid interview request: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("failed to sign room credential: {0}")]
    Credential(#[source] VideoError),
    #[error("agent dispatch failed: {0}")]
    AgentDispatch(#[source] VideoError),
    #[error("recording start failed: {0}")]
    RecordingStart(#[source] VideoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Websocket URL handed to participants.
    pub server_url: String,
    pub agent_name: String,
    /// Added to the planned duration when sizing the room credential.
    pub token_margin: Duration,
    pub empty_timeout_sec: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            agent_name: DEFAULT_AGENT_NAME.to_string(),
            token_margin: Duration::seconds(600),
            empty_timeout_sec: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinGrant {
    pub token: String,
    pub server_url: String,
    pub room_name: String,
    pub identity: String,
    pub expires_at: DateTime<Utc>,
    pub interview_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlockedScope {
    Global,
    Org,
}

impl From<BlockReason> for BlockedScope {
    fn from(reason: BlockReason) -> Self {
        match reason {
            BlockReason::GlobalLimit => BlockedScope::Global,
            BlockReason::OrgLimit => BlockedScope::Org,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: InterviewStatus,
    pub blocked: Option<BlockReason>,
    pub candidate_name: String,
    pub duration_sec: i32,
}

/// Result of one remote cleanup step.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum RemoteOutcome {
    Succeeded,
    /// Nothing to clean up.
    Skipped,
    Failed(String),
}

impl RemoteOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RemoteOutcome::Failed(_))
    }
}

/// What `end` managed to do. `completed` reflects the local row; the other
/// fields reflect the provider, whose failures never block completion.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeardownReport {
    pub completed: bool,
    pub recording: RemoteOutcome,
    pub room: RemoteOutcome,
}

impl TeardownReport {
    pub fn remote_clean(&self) -> bool {
        !self.recording.is_failed() && !self.room.is_failed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOutcome {
    pub interview: Interview,
    /// `None` when the interview was already completed before this call.
    pub teardown: Option<TeardownReport>,
}

pub struct LifecycleController {
    store: Arc<dyn InterviewStore>,
    video: Arc<dyn VideoProvider>,
    issuer: AccessTokenIssuer,
    config: LifecycleConfig,
}

fn record_join(outcome: &'static str) {
    metrics::counter!("iv_joins_total", "outcome" => outcome).increment(1);
}

/// Local writes whose failure is logged and counted but not surfaced.
fn bookkeeping_failed(step: &'static str, interview_id: &str, err: &StoreError) {
    metrics::counter!("iv_bookkeeping_failures_total", "step" => step).increment(1);
    warn!(interview_id, step, error = %err, "bookkeeping write failed");
}

fn remote_step(step: &'static str, interview_id: &str, result: Result<(), VideoError>) -> RemoteOutcome {
    match result {
        Ok(()) => RemoteOutcome::Succeeded,
        Err(err) => {
            metrics::counter!("iv_teardown_failures_total", "step" => step).increment(1);
            warn!(interview_id, step, error = %err, "remote teardown step failed");
            RemoteOutcome::Failed(err.to_string())
        }
    }
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn InterviewStore>,
        video: Arc<dyn VideoProvider>,
        issuer: AccessTokenIssuer,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            video,
            issuer,
            config,
        }
    }

    pub fn store(&self) -> &dyn InterviewStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    async fn resolve(&self, key: &str) -> Result<Interview, LifecycleError> {
        resolve_interview(self.store.as_ref(), key)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    /// Re-read after a guarded update matched nothing.
    async fn reload(&self, id: &str) -> Result<Interview, LifecycleError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    #[instrument(skip(self, input, settings))]
    pub async fn schedule(
        &self,
        org_id: &str,
        input: ScheduleInput,
        settings: &EffectiveSettings,
        now: DateTime<Utc>,
    ) -> Result<Interview, LifecycleError> {
        let new = schedule_interview(org_id, input, settings, now)?;
        let interview = self.store.insert_interview(&new).await?;

        metrics::counter!("iv_interviews_created_total").increment(1);
        info!(
            interview_id = %interview.id,
            duration_sec = interview.duration_sec,
            expires_at = %interview.expires_at,
            "interview scheduled"
        );
        Ok(interview)
    }

    /// Candidate-facing poll. Quota is only consulted while the interview
    /// can still be joined, and never blocks anything by itself.
    #[instrument(skip(self, key))]
    pub async fn status(
        &self,
        key: &str,
        fallback_max_concurrent: i64,
        now: DateTime<Utc>,
    ) -> Result<StatusReport, LifecycleError> {
        let interview = self.resolve(key).await?;
        if interview.is_expired_unused(now) {
            return Err(LifecycleError::Expired);
        }

        let blocked = if interview.status == InterviewStatus::Created {
            let settings = load_effective(
                self.store.as_ref(),
                Some(&interview.org_id),
                fallback_max_concurrent,
            )
            .await?;
            quota::evaluate(self.store.as_ref(), &settings, Some(&interview.org_id)).await?
        } else {
            None
        };

        Ok(StatusReport {
            status: interview.status,
            blocked,
            candidate_name: interview.candidate_name,
            duration_sec: interview.duration_sec,
        })
    }

    #[instrument(skip(self, key))]
    pub async fn join(&self, key: &str, now: DateTime<Utc>) -> Result<JoinGrant, LifecycleError> {
        let interview = self.resolve(key).await?;
        if interview.is_expired_unused(now) {
            record_join("expired");
            return Err(LifecycleError::Expired);
        }
        if interview.status != InterviewStatus::Created {
            record_join("conflict");
            return Err(LifecycleError::AlreadyUsed(interview.status));
        }

        // Signed up front so a signing failure leaves the row untouched.
        let ttl = Duration::seconds(i64::from(interview.duration_sec)) + self.config.token_margin;
        let token = self
            .issuer
            .issue(
                &interview.candidate_identity,
                Some(&interview.candidate_name),
                VideoGrant::join(&interview.room_name),
                ttl,
                now,
            )
            .map_err(LifecycleError::Credential)?;

        let interview = match self.store.claim_for_join(&interview.id, now).await? {
            JoinClaim::Claimed(interview) => interview,
            JoinClaim::AlreadyUsed(status) => {
                record_join("conflict");
                return Err(LifecycleError::AlreadyUsed(status));
            }
            JoinClaim::NotFound => return Err(LifecycleError::NotFound),
        };

        if let Err(err) = self
            .video
            .create_room(&interview.room_name, self.config.empty_timeout_sec)
            .await
        {
            // Dispatch creates the room on demand as well.
            warn!(interview_id = %interview.id, error = %err, "room pre-creation failed");
        }

        let metadata = AgentMetadata {
            prompt: &interview.prompt,
            opening_message: interview.opening_message.as_deref(),
        }
        .to_json()
        .map_err(LifecycleError::AgentDispatch)?;

        match self
            .video
            .dispatch_agent(&interview.room_name, &self.config.agent_name, &metadata)
            .await
        {
            Ok(dispatch_id) => {
                // The link is already spent, so a lost dispatch id never costs the grant.
                if let Err(err) = self
                    .store
                    .record_dispatch(&interview.id, &dispatch_id)
                    .await
                {
                    bookkeeping_failed("record_dispatch", &interview.id, &err);
                }
                info!(interview_id = %interview.id, %dispatch_id, "agent dispatched");
            }
            Err(err) => {
                record_join("dispatch_failed");
                warn!(interview_id = %interview.id, error = %err, "agent dispatch failed");
                self.store
                    .mark_failed(&interview.id, AGENT_DISPATCH_FAILED)
                    .await?;
                return Err(LifecycleError::AgentDispatch(err));
            }
        }

        record_join("joined");
        Ok(JoinGrant {
            token,
            server_url: self.config.server_url.clone(),
            room_name: interview.room_name,
            identity: interview.candidate_identity,
            expires_at: now + ttl,
            interview_id: interview.id,
        })
    }

    /// Idempotent. Only `used` advances; later states are returned unchanged.
    /// Concurrent callers race on a store-side claim so a single egress starts.
    #[instrument(skip(self, key))]
    pub async fn recording_started(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Interview, LifecycleError> {
        let interview = self.resolve(key).await?;

        match interview.status {
            InterviewStatus::Created => return Err(LifecycleError::NotStarted),
            InterviewStatus::Used => {}
            _ => return Ok(interview),
        }

        if interview.egress_id.is_none() {
            let object_key = interview.recording_object_key();
            if !self.store.claim_recording(&interview.id, &object_key).await? {
                // Another call holds the slot and starts the egress.
                return self.reload(&interview.id).await;
            }

            let egress_id = match self
                .video
                .start_recording(&interview.room_name, &object_key)
                .await
            {
                Ok(egress_id) => egress_id,
                Err(err) => {
                    warn!(interview_id = %interview.id, error = %err, "egress start failed");
                    if let Err(release_err) = self.store.release_recording(&interview.id).await {
                        bookkeeping_failed("release_recording", &interview.id, &release_err);
                    }
                    return Err(LifecycleError::RecordingStart(err));
                }
            };
            self.store.record_egress(&interview.id, &egress_id).await?;
            info!(interview_id = %interview.id, %egress_id, "recording started");
        }

        match self.store.mark_recording(&interview.id, now).await? {
            Some(updated) => Ok(updated),
            None => self.reload(&interview.id).await,
        }
    }

    /// Idempotent on `completed`. Remote cleanup errors are captured in the
    /// returned [`TeardownReport`] and never prevent completion.
    #[instrument(skip(self, key))]
    pub async fn end(&self, key: &str, now: DateTime<Utc>) -> Result<EndOutcome, LifecycleError> {
        let interview = self.resolve(key).await?;

        match interview.status {
            InterviewStatus::Completed => {
                return Ok(EndOutcome {
                    interview,
                    teardown: None,
                })
            }
            InterviewStatus::Failed => return Err(LifecycleError::Failed),
            _ => {}
        }

        let interview = match self.store.mark_ending(&interview.id).await? {
            Some(updated) => updated,
            None => {
                let current = self.reload(&interview.id).await?;
                return match current.status {
                    InterviewStatus::Completed => Ok(EndOutcome {
                        interview: current,
                        teardown: None,
                    }),
                    _ => Err(LifecycleError::Failed),
                };
            }
        };

        let recording = match interview.egress_id.as_deref() {
            Some(egress_id) => remote_step(
                "stop_recording",
                &interview.id,
                self.video.stop_recording(egress_id).await,
            ),
            None => RemoteOutcome::Skipped,
        };
        let room = remote_step(
            "delete_room",
            &interview.id,
            self.video.delete_room(&interview.room_name).await,
        );

        let interview = match self.store.mark_completed(&interview.id, now).await? {
            Some(updated) => updated,
            None => self.reload(&interview.id).await?,
        };

        let report = TeardownReport {
            completed: interview.status == InterviewStatus::Completed,
            recording,
            room,
        };

        if report.remote_clean() {
            info!(interview_id = %interview.id, "interview completed");
        } else {
            warn!(
                interview_id = %interview.id,
                recording = ?report.recording,
                room = ?report.room,
                "interview completed with remote cleanup failures"
            );
        }

        Ok(EndOutcome {
            interview,
            teardown: Some(report),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::memory::MemoryStore;
    use crate::quota::ConcurrencyCap;
    use crate::settings::SystemSettings;
    use crate::video::StubVideoProvider;

    struct Harness {
        store: Arc<MemoryStore>,
        video: Arc<StubVideoProvider>,
        controller: Arc<LifecycleController>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::default());
        let video = Arc::new(StubVideoProvider::default());
        let controller = Arc::new(LifecycleController::new(
            store.clone(),
            video.clone(),
            AccessTokenIssuer::new("APIkey", "secret-secret-secret"),
            LifecycleConfig {
                server_url: "wss://video.example".into(),
                ..Default::default()
            },
        ));
        Harness {
            store,
            video,
            controller,
        }
    }

    #[tokio::test]
    async fn concurrent_joins_have_exactly_one_winner() {
        let h = harness();
        let interview = h.store.seed_interview("org_1", InterviewStatus::Created);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let controller = h.controller.clone();
            let token = interview.public_token.clone();
            handles.push(tokio::spawn(async move {
                controller.join(&token, Utc::now()).await
            }));
        }

        let mut winners = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(LifecycleError::AlreadyUsed(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(conflicts, 15);
        assert_eq!(h.video.count("dispatch_agent"), 1);
    }

    #[tokio::test]
    async fn join_issues_credential_and_records_dispatch() {
        let h = harness();
        let interview = h.store.seed_interview("org_1", InterviewStatus::Created);
        let now = Utc::now();

        let grant = h.controller.join(&interview.id, now).await.unwrap();
        assert_eq!(grant.room_name, interview.room_name);
        assert_eq!(grant.server_url, "wss://video.example");
        assert_eq!(
            grant.expires_at,
            now + Duration::seconds(i64::from(interview.duration_sec) + 600)
        );

        let stored = h.store.snapshot(&interview.id).unwrap();
        assert_eq!(stored.status, InterviewStatus::Used);
        assert_eq!(stored.used_at, Some(now));
        assert_eq!(stored.agent_dispatch_id.as_deref(), Some("AD_1"));
    }

    #[tokio::test]
    async fn expired_unused_interview_cannot_be_joined_or_polled() {
        let h = harness();
        let mut interview = crate::memory::sample_interview("org_1", InterviewStatus::Created);
        interview.expires_at = Utc::now() - Duration::hours(1);
        let interview = h.store.insert_raw(interview);

        let err = h.controller.join(&interview.public_token, Utc::now()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Expired));

        // Quota pressure does not mask expiry.
        h.store.set_system_settings(SystemSettings {
            max_concurrent_interviews: Some(1),
            ..Default::default()
        });
        h.store.seed_interview("org_1", InterviewStatus::Recording);
        let err = h
            .controller
            .status(&interview.public_token, 10, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Expired));
        assert_eq!(h.video.count(""), 0);
    }

    #[tokio::test]
    async fn dispatch_failure_marks_interview_failed() {
        let h = harness();
        h.video.fail_dispatch.store(true, Ordering::SeqCst);
        let interview = h.store.seed_interview("org_1", InterviewStatus::Created);

        let err = h.controller.join(&interview.public_token, Utc::now()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::AgentDispatch(_)));

        let stored = h.store.snapshot(&interview.id).unwrap();
        assert_eq!(stored.status, InterviewStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some(AGENT_DISPATCH_FAILED));
    }

    #[tokio::test]
    async fn status_reports_global_block_for_joinable_interview() {
        let h = harness();
        h.store.set_system_settings(SystemSettings {
            max_concurrent_interviews: Some(5),
            ..Default::default()
        });
        for _ in 0..5 {
            h.store.seed_interview("org_2", InterviewStatus::Used);
        }
        let interview = h.store.seed_interview("org_1", InterviewStatus::Created);

        let report = h
            .controller
            .status(&interview.public_token, 10, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.status, InterviewStatus::Created);
        assert_eq!(report.blocked, Some(BlockReason::GlobalLimit));
    }

    #[tokio::test]
    async fn status_skips_quota_once_joined() {
        let h = harness();
        h.store.set_concurrency_cap(
            "org_1",
            ConcurrencyCap {
                plan_cap: Some(1),
                override_cap: None,
            },
        );
        let interview = h.store.seed_interview("org_1", InterviewStatus::Used);

        let report = h.controller.status(&interview.id, 10, Utc::now()).await.unwrap();
        assert_eq!(report.status, InterviewStatus::Used);
        assert_eq!(report.blocked, None);
    }

    #[tokio::test]
    async fn recording_start_is_idempotent() {
        let h = harness();
        let interview = h.store.seed_interview("org_1", InterviewStatus::Used);
        let first_at = Utc::now();

        let first = h
            .controller
            .recording_started(&interview.public_token, first_at)
            .await
            .unwrap();
        assert_eq!(first.status, InterviewStatus::Recording);
        assert_eq!(first.recording_started_at, Some(first_at));
        assert_eq!(
            first.storage_object_key.as_deref(),
            Some(format!("recordings/org_1/{}.mp4", interview.id).as_str())
        );

        let second = h
            .controller
            .recording_started(&interview.public_token, first_at + Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(second.recording_started_at, Some(first_at));
        assert_eq!(h.video.count("start_recording"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_recording_starts_launch_one_egress() {
        let h = harness();
        let interview = h.store.seed_interview("org_1", InterviewStatus::Used);

        let mut handles = Vec::new();
        for _ in 0..12 {
            let controller = h.controller.clone();
            let token = interview.public_token.clone();
            handles.push(tokio::spawn(async move {
                controller.recording_started(&token, Utc::now()).await
            }));
        }
        for handle in handles {
            let current = handle.await.unwrap().unwrap();
            assert!(matches!(
                current.status,
                InterviewStatus::Used | InterviewStatus::Recording
            ));
        }

        assert_eq!(h.video.count("start_recording"), 1);
        let stored = h.store.snapshot(&interview.id).unwrap();
        assert_eq!(stored.status, InterviewStatus::Recording);
        assert!(stored.egress_id.is_some());
        assert_eq!(
            stored.storage_object_key.as_deref(),
            Some(format!("recordings/org_1/{}.mp4", interview.id).as_str())
        );
    }

    #[tokio::test]
    async fn join_survives_failed_dispatch_bookkeeping() {
        let h = harness();
        h.store.fail_record_dispatch.store(true, Ordering::SeqCst);
        let interview = h.store.seed_interview("org_1", InterviewStatus::Created);

        let grant = h
            .controller
            .join(&interview.public_token, Utc::now())
            .await
            .unwrap();
        assert_eq!(grant.interview_id, interview.id);
        assert_eq!(h.video.count("dispatch_agent"), 1);

        let stored = h.store.snapshot(&interview.id).unwrap();
        assert_eq!(stored.status, InterviewStatus::Used);
        assert_eq!(stored.agent_dispatch_id, None);
        assert_eq!(stored.failure_reason, None);
    }

    #[tokio::test]
    async fn end_retried_mid_teardown_completes() {
        let h = harness();
        let interview = h.store.seed_interview("org_1", InterviewStatus::Ending);

        let outcome = h.controller.end(&interview.public_token, Utc::now()).await.unwrap();
        assert_eq!(outcome.interview.status, InterviewStatus::Completed);
        assert!(outcome.teardown.is_some());
        assert_eq!(h.video.count("delete_room"), 1);
    }

    #[tokio::test]
    async fn recording_start_failure_keeps_status_used() {
        let h = harness();
        h.video.fail_recording.store(true, Ordering::SeqCst);
        let interview = h.store.seed_interview("org_1", InterviewStatus::Used);

        let err = h
            .controller
            .recording_started(&interview.id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::RecordingStart(_)));
        let stored = h.store.snapshot(&interview.id).unwrap();
        assert_eq!(stored.status, InterviewStatus::Used);
        assert_eq!(stored.storage_object_key, None);

        // The released slot lets a later call start the egress.
        h.video.fail_recording.store(false, Ordering::SeqCst);
        let retried = h
            .controller
            .recording_started(&interview.id, Utc::now())
            .await
            .unwrap();
        assert_eq!(retried.status, InterviewStatus::Recording);
        assert_eq!(h.video.count("start_recording"), 2);

        let err = h
            .controller
            .recording_started(
                &h.store.seed_interview("org_1", InterviewStatus::Created).id,
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotStarted));
    }

    #[tokio::test]
    async fn end_is_idempotent_and_keeps_object_key() {
        let h = harness();
        let interview = h.store.seed_interview("org_1", InterviewStatus::Used);
        h.controller
            .recording_started(&interview.public_token, Utc::now())
            .await
            .unwrap();

        let first = h.controller.end(&interview.public_token, Utc::now()).await.unwrap();
        let report = first.teardown.clone().unwrap();
        assert!(report.completed);
        assert_eq!(report.recording, RemoteOutcome::Succeeded);
        assert_eq!(report.room, RemoteOutcome::Succeeded);
        assert_eq!(first.interview.status, InterviewStatus::Completed);

        let second = h.controller.end(&interview.public_token, Utc::now()).await.unwrap();
        assert!(second.teardown.is_none());
        assert_eq!(second.interview.status, InterviewStatus::Completed);
        assert_eq!(
            second.interview.storage_object_key,
            first.interview.storage_object_key
        );
        assert_eq!(h.video.count("stop_recording"), 1);
    }

    #[tokio::test]
    async fn teardown_failures_do_not_block_completion() {
        let h = harness();
        h.video.fail_stop.store(true, Ordering::SeqCst);
        h.video.fail_delete.store(true, Ordering::SeqCst);
        let interview = h.store.seed_interview("org_1", InterviewStatus::Used);
        h.controller
            .recording_started(&interview.id, Utc::now())
            .await
            .unwrap();

        let outcome = h.controller.end(&interview.id, Utc::now()).await.unwrap();
        let report = outcome.teardown.unwrap();
        assert!(report.completed);
        assert!(report.recording.is_failed());
        assert!(report.room.is_failed());
        assert!(!report.remote_clean());
        assert_eq!(outcome.interview.status, InterviewStatus::Completed);
        assert!(outcome.interview.ended_at.is_some());
    }

    #[tokio::test]
    async fn end_without_recording_skips_egress_stop() {
        let h = harness();
        let interview = h.store.seed_interview("org_1", InterviewStatus::Used);

        let outcome = h.controller.end(&interview.id, Utc::now()).await.unwrap();
        assert_eq!(outcome.teardown.unwrap().recording, RemoteOutcome::Skipped);
        assert_eq!(h.video.count("stop_recording"), 0);
        assert_eq!(h.video.count("delete_room"), 1);
    }

    #[tokio::test]
    async fn failed_interview_cannot_be_ended() {
        let h = harness();
        let interview = h.store.seed_interview("org_1", InterviewStatus::Failed);
        let err = h.controller.end(&interview.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Failed));
    }
}

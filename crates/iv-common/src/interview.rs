use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use thiserror::Error;
use ulid::Ulid;

use crate::settings::EffectiveSettings;

pub const MIN_DURATION_SEC: i32 = 60;
pub const MAX_DURATION_SEC: i32 = 1800;
pub const DEFAULT_DURATION_SEC: i32 = 600;
pub const MAX_CANDIDATE_NAME_CHARS: usize = 80;
pub const MAX_PROMPT_CHARS: usize = 4000;
pub const MAX_OPENING_MESSAGE_CHARS: usize = 1000;
/// Upper bound for public tokens and legacy ids accepted on lookup routes.
pub const MAX_LOOKUP_KEY_CHARS: usize = 128;
pub const DEFAULT_CANDIDATE_NAME: &str = "候補者";
const PUBLIC_TOKEN_LEN: usize = 32;

pub const DEFAULT_INTERVIEW_PROMPT: &str = concat!(
    "あなたは日本語で話す面接官の人工知能です。",
    "目的は候補者の経験と考え方を短時間で把握することです。",
    "質問は大きく三つだけにします。",
    "各質問では候補者の回答をよく聞き、重要度が高い点を1つ選び、2〜3回だけ深掘りします。",
    "口調は丁寧で落ち着いていて、短く分かりやすく話します。",
    "分からない点は推測せず確認してください。",
    "最後に要点を短くまとめて終了してください。\n\n",
    "本質問1: 最近の仕事やプロジェクトで、主担当として成果を出した取り組みを一つ教えてください。\n",
    "本質問2: 難しい状況やトラブルに直面したとき、どうやって立て直しましたか。具体例で教えてください。\n",
    "本質問3: 次の職場や役割で実現したいことは何ですか。",
);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InterviewStatus {
    Created,
    Used,
    Recording,
    Ending,
    Completed,
    Failed,
}

impl InterviewStatus {
    pub const ACTIVE: [InterviewStatus; 3] = [
        InterviewStatus::Used,
        InterviewStatus::Recording,
        InterviewStatus::Ending,
    ];

    pub const ALL: [InterviewStatus; 6] = [
        InterviewStatus::Created,
        InterviewStatus::Used,
        InterviewStatus::Recording,
        InterviewStatus::Ending,
        InterviewStatus::Completed,
        InterviewStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewStatus::Created => "created",
            InterviewStatus::Used => "used",
            InterviewStatus::Recording => "recording",
            InterviewStatus::Ending => "ending",
            InterviewStatus::Completed => "completed",
            InterviewStatus::Failed => "failed",
        }
    }

    /// Counted against concurrency caps.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InterviewStatus::Completed | InterviewStatus::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// `created → used → recording → ending → completed`; `ending` is also
    /// reachable from `created`/`used` (end before recording) and re-entered by
    /// a retried end, and `failed` from any non-terminal state. Every store
    /// derives its status guards from this table.
    pub fn can_transition_to(&self, next: InterviewStatus) -> bool {
        use InterviewStatus::*;

        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (_, Failed) => true,
            (Created, Used) => true,
            (Used, Recording) => true,
            (Created | Used | Recording | Ending, Ending) => true,
            (Ending, Completed) => true,
            _ => false,
        }
    }

    /// Statuses from which `next` may be entered.
    pub fn predecessors(next: InterviewStatus) -> Vec<InterviewStatus> {
        Self::ALL
            .into_iter()
            .filter(|status| status.can_transition_to(next))
            .collect()
    }
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Decision {
    #[default]
    Undecided,
    Pass,
    Fail,
    Hold,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Undecided => "undecided",
            Decision::Pass => "pass",
            Decision::Fail => "fail",
            Decision::Hold => "hold",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    pub id: String,
    pub public_token: String,
    pub org_id: String,
    pub room_name: String,
    pub candidate_identity: String,
    pub candidate_name: String,
    pub prompt: String,
    pub opening_message: Option<String>,
    pub status: InterviewStatus,
    pub duration_sec: i32,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub recording_started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub agent_dispatch_id: Option<String>,
    pub egress_id: Option<String>,
    pub storage_object_key: Option<String>,
    pub decision: Decision,
    pub failure_reason: Option<String>,
}

impl Interview {
    /// Expired links are only reported while the interview has never been used.
    pub fn is_expired_unused(&self, now: DateTime<Utc>) -> bool {
        self.status == InterviewStatus::Created && self.used_at.is_none() && self.expires_at <= now
    }

    /// Reference point for transcript offsets.
    pub fn transcript_anchor(&self) -> DateTime<Utc> {
        self.recording_started_at
            .or(self.used_at)
            .unwrap_or(self.created_at)
    }

    pub fn recording_object_key(&self) -> String {
        format!("recordings/{}/{}.mp4", self.org_id, self.id)
    }
}

/// Row to insert when scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInterview {
    pub id: String,
    pub public_token: String,
    pub org_id: String,
    pub room_name: String,
    pub candidate_identity: String,
    pub candidate_name: String,
    pub prompt: String,
    pub opening_message: Option<String>,
    pub duration_sec: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewInterview {
    pub fn into_interview(self) -> Interview {
        Interview {
            id: self.id,
            public_token: self.public_token,
            org_id: self.org_id,
            room_name: self.room_name,
            candidate_identity: self.candidate_identity,
            candidate_name: self.candidate_name,
            prompt: self.prompt,
            opening_message: self.opening_message,
            status: InterviewStatus::Created,
            duration_sec: self.duration_sec,
            created_at: self.created_at,
            used_at: None,
            recording_started_at: None,
            ended_at: None,
            expires_at: self.expires_at,
            agent_dispatch_id: None,
            egress_id: None,
            storage_object_key: None,
            decision: Decision::Undecided,
            failure_reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("candidate name exceeds 80 characters")]
    CandidateNameTooLong,
    #[error("opening message exceeds 1000 characters")]
    OpeningMessageTooLong,
}

/// Caller-supplied scheduling input before clamping.
#[derive(Debug, Clone, Default)]
pub struct ScheduleInput {
    pub duration_sec: Option<i64>,
    pub candidate_name: Option<String>,
    pub prompt: Option<String>,
    pub opening_message: Option<String>,
}

pub fn clamp_duration_sec(requested: Option<i64>, fallback: i32) -> i32 {
    let value = requested.unwrap_or(i64::from(fallback));
    value.clamp(i64::from(MIN_DURATION_SEC), i64::from(MAX_DURATION_SEC)) as i32
}

/// Truncate on a char boundary.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

pub fn resolve_prompt(prompt: Option<&str>) -> String {
    let trimmed = prompt.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        DEFAULT_INTERVIEW_PROMPT.to_string()
    } else {
        truncate_chars(trimmed, MAX_PROMPT_CHARS)
    }
}

pub fn generate_public_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PUBLIC_TOKEN_LEN)
        .map(char::from)
        .collect()
}

pub fn schedule_interview(
    org_id: &str,
    input: ScheduleInput,
    settings: &EffectiveSettings,
    now: DateTime<Utc>,
) -> Result<NewInterview, ScheduleError> {
    let candidate_name = match input.candidate_name.as_deref().map(str::trim) {
        Some(name) if name.chars().count() > MAX_CANDIDATE_NAME_CHARS => {
            return Err(ScheduleError::CandidateNameTooLong);
        }
        Some(name) if !name.is_empty() => name.to_string(),
        _ => DEFAULT_CANDIDATE_NAME.to_string(),
    };

    let opening_message = match input.opening_message.as_deref().map(str::trim) {
        Some(message) if message.chars().count() > MAX_OPENING_MESSAGE_CHARS => {
            return Err(ScheduleError::OpeningMessageTooLong);
        }
        Some(message) if !message.is_empty() => Some(message.to_string()),
        _ => None,
    };

    let id = Ulid::new().to_string();
    let public_token = generate_public_token();

    Ok(NewInterview {
        room_name: format!("interview-{}", id.to_lowercase()),
        candidate_identity: format!("candidate-{}", id.to_lowercase()),
        id,
        public_token,
        org_id: org_id.to_string(),
        candidate_name,
        prompt: resolve_prompt(input.prompt.as_deref()),
        opening_message,
        duration_sec: clamp_duration_sec(input.duration_sec, settings.default_duration_sec),
        created_at: now,
        expires_at: now + settings.expiry.to_duration(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ExpiryParts;
    use chrono::Duration;

    fn settings() -> EffectiveSettings {
        EffectiveSettings {
            default_duration_sec: DEFAULT_DURATION_SEC,
            expiry: ExpiryParts {
                weeks: 0,
                days: 2,
                hours: 0,
            },
            global_max_concurrent: 10,
        }
    }

    #[test]
    fn duration_is_clamped_into_supported_window() {
        assert_eq!(clamp_duration_sec(Some(5000), 600), 1800);
        assert_eq!(clamp_duration_sec(Some(5), 600), 60);
        assert_eq!(clamp_duration_sec(Some(-30), 600), 60);
        assert_eq!(clamp_duration_sec(None, 600), 600);
        assert_eq!(clamp_duration_sec(Some(900), 600), 900);
    }

    #[test]
    fn empty_prompt_falls_back_to_default() {
        assert_eq!(resolve_prompt(None), DEFAULT_INTERVIEW_PROMPT);
        assert_eq!(resolve_prompt(Some("   ")), DEFAULT_INTERVIEW_PROMPT);
        assert_eq!(resolve_prompt(Some("  ask about rust ")), "ask about rust");
    }

    #[test]
    fn long_prompt_is_truncated_on_char_boundary() {
        let prompt = "面".repeat(MAX_PROMPT_CHARS + 10);
        let resolved = resolve_prompt(Some(&prompt));
        assert_eq!(resolved.chars().count(), MAX_PROMPT_CHARS);
    }

    #[test]
    fn schedule_applies_defaults_and_expiry() {
        let now = Utc::now();
        let new = schedule_interview(
            "org_1",
            ScheduleInput {
                duration_sec: Some(5000),
                ..Default::default()
            },
            &settings(),
            now,
        )
        .unwrap();

        assert_eq!(new.duration_sec, 1800);
        assert_eq!(new.candidate_name, DEFAULT_CANDIDATE_NAME);
        assert_eq!(new.prompt, DEFAULT_INTERVIEW_PROMPT);
        assert_eq!(new.expires_at, now + Duration::days(2));
        assert_eq!(new.public_token.len(), 32);
        assert!(new.room_name.starts_with("interview-"));
        assert_ne!(new.public_token, new.id);
    }

    #[test]
    fn schedule_rejects_oversized_candidate_name() {
        let err = schedule_interview(
            "org_1",
            ScheduleInput {
                candidate_name: Some("x".repeat(81)),
                ..Default::default()
            },
            &settings(),
            Utc::now(),
        )
        .unwrap_err();

        assert_eq!(err, ScheduleError::CandidateNameTooLong);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            InterviewStatus::Created,
            InterviewStatus::Used,
            InterviewStatus::Recording,
            InterviewStatus::Ending,
            InterviewStatus::Completed,
            InterviewStatus::Failed,
        ] {
            let parsed: InterviewStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
            assert_eq!(status.as_ref(), status.as_str());
        }
    }

    #[test]
    fn only_mid_lifecycle_states_are_active() {
        assert!(!InterviewStatus::Created.is_active());
        assert!(InterviewStatus::Used.is_active());
        assert!(InterviewStatus::Recording.is_active());
        assert!(InterviewStatus::Ending.is_active());
        assert!(!InterviewStatus::Completed.is_active());
        assert!(!InterviewStatus::Failed.is_active());
    }

    #[test]
    fn terminal_states_accept_no_transition() {
        assert!(!InterviewStatus::Completed.can_transition_to(InterviewStatus::Failed));
        assert!(!InterviewStatus::Failed.can_transition_to(InterviewStatus::Ending));
        assert!(InterviewStatus::Recording.can_transition_to(InterviewStatus::Failed));
        assert!(InterviewStatus::Created.can_transition_to(InterviewStatus::Used));
        assert!(!InterviewStatus::Created.can_transition_to(InterviewStatus::Recording));
        assert!(!InterviewStatus::Recording.can_transition_to(InterviewStatus::Used));
    }

    #[test]
    fn predecessors_follow_the_transition_table() {
        use InterviewStatus::*;

        assert_eq!(InterviewStatus::predecessors(Used), vec![Created]);
        assert_eq!(InterviewStatus::predecessors(Recording), vec![Used]);
        assert_eq!(
            InterviewStatus::predecessors(Ending),
            vec![Created, Used, Recording, Ending]
        );
        assert_eq!(InterviewStatus::predecessors(Completed), vec![Ending]);
        assert_eq!(
            InterviewStatus::predecessors(Failed),
            vec![Created, Used, Recording, Ending]
        );
        assert!(InterviewStatus::predecessors(Created).is_empty());
    }

    #[test]
    fn expiry_only_applies_to_unused_interviews() {
        let now = Utc::now();
        let mut interview = schedule_interview("org", ScheduleInput::default(), &settings(), now)
            .unwrap()
            .into_interview();
        interview.expires_at = now - Duration::minutes(1);
        assert!(interview.is_expired_unused(now));

        interview.status = InterviewStatus::Used;
        interview.used_at = Some(now - Duration::minutes(5));
        assert!(!interview.is_expired_unused(now));
    }
}

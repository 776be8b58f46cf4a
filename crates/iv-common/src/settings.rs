use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::interview::DEFAULT_DURATION_SEC;
use crate::store::{InterviewStore, StoreError};

pub const MIN_DEFAULT_DURATION_MIN: i64 = 1;
pub const MAX_DEFAULT_DURATION_MIN: i64 = 10;
pub const MAX_EXPIRES_WEEKS: i64 = 4;
pub const MAX_EXPIRES_DAYS: i64 = 6;
pub const MAX_EXPIRES_HOURS: i64 = 23;
pub const FALLBACK_MAX_CONCURRENT: i64 = 10;

/// Link lifetime expressed the way admins configure it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpiryParts {
    pub weeks: i32,
    pub days: i32,
    pub hours: i32,
}

impl ExpiryParts {
    pub const ONE_WEEK: ExpiryParts = ExpiryParts {
        weeks: 1,
        days: 0,
        hours: 0,
    };

    pub fn is_zero(&self) -> bool {
        self.weeks == 0 && self.days == 0 && self.hours == 0
    }

    /// An all-zero breakdown means one week.
    pub fn to_duration(&self) -> Duration {
        let parts = if self.is_zero() { Self::ONE_WEEK } else { *self };
        Duration::weeks(i64::from(parts.weeks))
            + Duration::days(i64::from(parts.days))
            + Duration::hours(i64::from(parts.hours))
    }
}

impl Default for ExpiryParts {
    fn default() -> Self {
        Self::ONE_WEEK
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrgSettings {
    pub org_id: String,
    pub default_duration_min: i32,
    pub default_expires_weeks: i32,
    pub default_expires_days: i32,
    pub default_expires_hours: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrgSettings {
    pub fn defaults_for(org_id: &str) -> Self {
        Self {
            org_id: org_id.to_string(),
            default_duration_min: DEFAULT_DURATION_SEC / 60,
            default_expires_weeks: 1,
            default_expires_days: 0,
            default_expires_hours: 0,
            updated_at: None,
        }
    }

    pub fn expiry(&self) -> ExpiryParts {
        ExpiryParts {
            weeks: self.default_expires_weeks,
            days: self.default_expires_days,
            hours: self.default_expires_hours,
        }
    }
}

/// Global row; every column is optional until an operator writes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    pub default_duration_min: Option<i32>,
    pub default_expires_weeks: Option<i32>,
    pub default_expires_days: Option<i32>,
    pub default_expires_hours: Option<i32>,
    pub max_concurrent_interviews: Option<i32>,
}

impl SystemSettings {
    /// Bound every present column the way org patches are bounded. Unset
    /// columns stay unset so resolution keeps falling through to defaults.
    pub fn clamped(&self) -> SystemSettings {
        let bound = |value: Option<i32>, min: i64, max: i64| {
            value.map(|value| i64::from(value).clamp(min, max) as i32)
        };

        SystemSettings {
            default_duration_min: bound(
                self.default_duration_min,
                MIN_DEFAULT_DURATION_MIN,
                MAX_DEFAULT_DURATION_MIN,
            ),
            default_expires_weeks: bound(self.default_expires_weeks, 0, MAX_EXPIRES_WEEKS),
            default_expires_days: bound(self.default_expires_days, 0, MAX_EXPIRES_DAYS),
            default_expires_hours: bound(self.default_expires_hours, 0, MAX_EXPIRES_HOURS),
            max_concurrent_interviews: self.max_concurrent_interviews.map(|cap| cap.max(0)),
        }
    }

    fn expiry(&self) -> Option<ExpiryParts> {
        if self.default_expires_weeks.is_none()
            && self.default_expires_days.is_none()
            && self.default_expires_hours.is_none()
        {
            return None;
        }

        Some(ExpiryParts {
            weeks: self.default_expires_weeks.unwrap_or(0),
            days: self.default_expires_days.unwrap_or(0),
            hours: self.default_expires_hours.unwrap_or(0),
        })
    }
}

/// Admin PATCH body before clamping. Missing fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub default_duration_min: Option<i64>,
    pub default_expires_weeks: Option<i64>,
    pub default_expires_days: Option<i64>,
    pub default_expires_hours: Option<i64>,
}

impl SettingsPatch {
    /// Apply onto `current`, clamping each field to its documented bounds.
    pub fn apply(&self, current: &OrgSettings) -> OrgSettings {
        let pick = |value: Option<i64>, fallback: i32, min: i64, max: i64| -> i32 {
            value.unwrap_or(i64::from(fallback)).clamp(min, max) as i32
        };

        let mut next = OrgSettings {
            org_id: current.org_id.clone(),
            default_duration_min: pick(
                self.default_duration_min,
                current.default_duration_min,
                MIN_DEFAULT_DURATION_MIN,
                MAX_DEFAULT_DURATION_MIN,
            ),
            default_expires_weeks: pick(
                self.default_expires_weeks,
                current.default_expires_weeks,
                0,
                MAX_EXPIRES_WEEKS,
            ),
            default_expires_days: pick(
                self.default_expires_days,
                current.default_expires_days,
                0,
                MAX_EXPIRES_DAYS,
            ),
            default_expires_hours: pick(
                self.default_expires_hours,
                current.default_expires_hours,
                0,
                MAX_EXPIRES_HOURS,
            ),
            updated_at: current.updated_at,
        };

        if next.expiry().is_zero() {
            next.default_expires_weeks = ExpiryParts::ONE_WEEK.weeks;
        }

        next
    }
}

/// Configuration resolved once per request from the system row, the org row
/// and process defaults, then passed explicitly to whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    pub default_duration_sec: i32,
    pub expiry: ExpiryParts,
    pub global_max_concurrent: i64,
}

impl EffectiveSettings {
    pub fn resolve(
        system: Option<&SystemSettings>,
        org: Option<&OrgSettings>,
        fallback_max_concurrent: i64,
    ) -> Self {
        let default_duration_min = org
            .map(|org| org.default_duration_min)
            .or_else(|| system.and_then(|sys| sys.default_duration_min));

        let expiry = org
            .map(OrgSettings::expiry)
            .or_else(|| system.and_then(SystemSettings::expiry))
            .unwrap_or_default();

        let global_max_concurrent = system
            .and_then(|sys| sys.max_concurrent_interviews)
            .map(i64::from)
            .unwrap_or(fallback_max_concurrent);

        Self {
            default_duration_sec: default_duration_min
                .map(|min| min.saturating_mul(60))
                .unwrap_or(DEFAULT_DURATION_SEC),
            expiry,
            global_max_concurrent,
        }
    }
}

/// Stored org row, or the built-in defaults when the org never saved one.
pub async fn org_settings_or_default(
    store: &dyn InterviewStore,
    org_id: &str,
) -> Result<OrgSettings, StoreError> {
    Ok(store
        .org_settings(org_id)
        .await?
        .unwrap_or_else(|| OrgSettings::defaults_for(org_id)))
}

/// Clamp and persist the global row, creating it on first write.
pub async fn save_system_settings(
    store: &dyn InterviewStore,
    settings: &SystemSettings,
) -> Result<SystemSettings, StoreError> {
    store.upsert_system_settings(&settings.clamped()).await
}

/// Read the system and org rows for one request and resolve them.
pub async fn load_effective(
    store: &dyn InterviewStore,
    org_id: Option<&str>,
    fallback_max_concurrent: i64,
) -> Result<EffectiveSettings, StoreError> {
    let system = store.system_settings().await?;
    let org = match org_id {
        Some(org_id) => store.org_settings(org_id).await?,
        None => None,
    };

    Ok(EffectiveSettings::resolve(
        system.as_ref(),
        org.as_ref(),
        fallback_max_concurrent,
    ))
}

//! Advisory concurrency admission.
//!
//! The evaluator is read-only: it counts active interviews and compares them
//! against the global cap and the organization's subscription cap. Nothing in
//! the join path consults it, so under contention more sessions than the
//! nominal cap can become active.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::settings::EffectiveSettings;
use crate::store::{InterviewStore, StoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    GlobalLimit,
    OrgLimit,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::GlobalLimit => "GLOBAL_LIMIT",
            BlockReason::OrgLimit => "ORG_LIMIT",
        }
    }
}

/// Subscription row joined with its plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConcurrencyCap {
    pub plan_cap: Option<i32>,
    pub override_cap: Option<i32>,
}

impl ConcurrencyCap {
    /// Override first, then the plan default. Zero or negative means unlimited.
    pub fn effective(&self) -> Option<i64> {
        self.override_cap
            .or(self.plan_cap)
            .map(i64::from)
            .filter(|cap| *cap > 0)
    }
}

fn limit_reached(cap: i64, active: i64) -> bool {
    cap > 0 && active >= cap
}

#[instrument(skip(store, settings))]
pub async fn evaluate(
    store: &dyn InterviewStore,
    settings: &EffectiveSettings,
    org_id: Option<&str>,
) -> Result<Option<BlockReason>, StoreError> {
    let global_active = store.count_active(None).await?;
    if limit_reached(settings.global_max_concurrent, global_active) {
        debug!(
            global_active,
            global_max = settings.global_max_concurrent,
            "global concurrency limit reached"
        );
        return Ok(Some(BlockReason::GlobalLimit));
    }

    let Some(org_id) = org_id else {
        return Ok(None);
    };

    let Some(cap) = store
        .concurrency_cap(org_id)
        .await?
        .and_then(|cap| cap.effective())
    else {
        return Ok(None);
    };

    let org_active = store.count_active(Some(org_id)).await?;
    if limit_reached(cap, org_active) {
        debug!(org_active, org_cap = cap, "org concurrency limit reached");
        return Ok(Some(BlockReason::OrgLimit));
    }

    Ok(None)
}

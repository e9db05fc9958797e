//! Import job lifecycle.
//!
//! A job moves `queued → running → done | failed`; `done` and `failed` are
//! terminal. Orthogonally, a sticky `cancelled` flag asks the worker to stop
//! at its next poll without touching the state axis. The two axes are kept
//! separate on purpose: collapsing them would lose the distinction between
//! "asked to stop" and "actually stopped", which the force-cancel grace
//! period depends on.
//!
//! Force cancel bypasses the worker entirely and finalizes the job as
//! `failed`. It is withheld for a grace period after creation: a cooperative
//! cancel flag can race with a worker that has not started polling yet, and
//! force-cancelling during that window could discard a job the worker is
//! about to legitimately begin. Once the window elapses the job is presumed
//! stuck and may be terminated unilaterally.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Seconds after creation during which force cancel is rejected.
pub const FORCE_CANCEL_GRACE_SECS: i64 = 60;

/// Default age for bulk cleanup, in days.
pub const CLEANUP_DEFAULT_DAYS: i64 = 7;
/// Bounds applied to caller-supplied cleanup ages.
pub const CLEANUP_MIN_DAYS: i64 = 1;
pub const CLEANUP_MAX_DAYS: i64 = 365;

/// Job state axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<JobState> {
        match s {
            "queued" => Some(JobState::Queued),
            "running" => Some(JobState::Running),
            "done" => Some(JobState::Done),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// One bulk-translation import job.
#[derive(Debug, Clone, Serialize)]
pub struct ImportJob {
    pub id: i64,
    pub requested_by: String,
    pub state: JobState,
    pub cancelled: bool,
    pub created_at: String,
    pub finished_at: Option<String>,
    pub stats: Option<Value>,
}

impl ImportJob {
    /// Age of the job in whole seconds at `now`.
    ///
    /// An unparseable creation timestamp counts as infinitely old, so a
    /// corrupted row never becomes impossible to force-cancel.
    pub fn age_seconds(&self, now: chrono::DateTime<chrono::Utc>) -> i64 {
        match chrono::DateTime::parse_from_rfc3339(&self.created_at) {
            Ok(created) => (now - created.with_timezone(&chrono::Utc)).num_seconds(),
            Err(_) => i64::MAX,
        }
    }
}

/// Guard for the cooperative cancel flag: only live jobs can be asked to stop.
pub fn check_cooperative_cancel(state: JobState) -> Result<(), StoreError> {
    if state.is_terminal() {
        return Err(StoreError::NotCancellable);
    }
    Ok(())
}

/// Guard for force cancel.
///
/// Terminal jobs are rejected outright. Inside the grace window the request
/// is rejected with the seconds left to wait, unless the job already carries
/// a cooperative cancel flag (the requester has signalled intent and the
/// worker has had its chance to observe it).
pub fn check_force_cancel(state: JobState, cancelled: bool, age_seconds: i64) -> Result<(), StoreError> {
    if state.is_terminal() {
        return Err(StoreError::NotCancellable);
    }
    if age_seconds < FORCE_CANCEL_GRACE_SECS && !cancelled {
        return Err(StoreError::GracePeriod {
            wait_seconds: FORCE_CANCEL_GRACE_SECS - age_seconds,
        });
    }
    Ok(())
}

/// Guard for deletion: only terminal jobs can be removed.
pub fn check_delete(state: JobState) -> Result<(), StoreError> {
    if !state.is_terminal() {
        return Err(StoreError::NotDeletable);
    }
    Ok(())
}

/// Clamp a caller-supplied cleanup age into the allowed range.
pub fn clamp_cleanup_days(days: Option<i64>) -> i64 {
    days.unwrap_or(CLEANUP_DEFAULT_DAYS)
        .clamp(CLEANUP_MIN_DAYS, CLEANUP_MAX_DAYS)
}

/// Validate the caller-supplied cleanup state set, defaulting to both
/// terminal states. Non-terminal states are rejected.
pub fn cleanup_states(states: Option<&[JobState]>) -> Result<Vec<JobState>, StoreError> {
    match states {
        None => Ok(vec![JobState::Done, JobState::Failed]),
        Some([]) => Err(StoreError::Invalid("states must not be empty".to_string())),
        Some(states) => {
            for state in states {
                if !state.is_terminal() {
                    return Err(StoreError::Invalid(format!(
                        "cleanup only applies to terminal states, got '{}'",
                        state.as_str()
                    )));
                }
            }
            Ok(states.to_vec())
        }
    }
}

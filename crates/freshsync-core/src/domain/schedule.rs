//! Next-execution-time calculation
//!
//! Pure, side-effect-free scheduling arithmetic: given a rule, its state
//! record, and its most recent job, compute when the scheduler should next
//! look at the rule and why. The scheduler persists nothing here; it feeds
//! the decision into its priority queue.
//!
//! ## Decision table
//!
//! | Recent job state            | Next execution                              |
//! |-----------------------------|---------------------------------------------|
//! | none (never scheduled)      | `now`                                       |
//! | `DoneSuccess`               | `last_reported + max_destination_age` (24 h default) |
//! | `DoneFailure`               | `last_reported + min_retry_time` (15 min default)    |
//! | `Preparing/Ready/Executing` | parked a year out; an event wakes it early  |
//!
//! A disabled rule is always parked regardless of its job history.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::job::{Job, JobState};
use super::rule::{Rule, RuleState};

/// Fallback destination age when a rule leaves `max_destination_age` unset
#[must_use]
pub fn default_max_destination_age() -> Duration {
    Duration::hours(24)
}

/// Fallback retry wait when a rule leaves `min_retry_time` unset
#[must_use]
pub fn default_min_retry_time() -> Duration {
    Duration::minutes(15)
}

/// Parking distance for rules that cannot become due by time alone
///
/// A rule with a live job (or a disabled rule) is pushed this far into the
/// future; only an explicit event can wake it earlier. The value is long
/// enough to be "never" in practice while keeping the queue arithmetic
/// total-ordered and overflow-free.
#[must_use]
pub fn parked_window() -> Duration {
    Duration::days(365)
}

// ============================================================================
// ScheduleReason
// ============================================================================

/// Why a rule is scheduled at its computed time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleReason {
    /// The rule has never produced a job
    InitialSchedule,
    /// The last result's freshness window runs out at the scheduled time
    MaxAgeExpired,
    /// The last job failed; waiting out the retry delay
    RetryAfterFailure,
    /// A job is still live; parked until its completion event arrives
    JobInProgress,
    /// The rule was created or modified; re-evaluated from scratch
    RuleModified,
    /// A user forced the rule to run now
    ManualTrigger,
    /// The rule is switched off
    Disabled,
}

impl fmt::Display for ScheduleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScheduleReason::InitialSchedule => "initial schedule",
            ScheduleReason::MaxAgeExpired => "max destination age expired",
            ScheduleReason::RetryAfterFailure => "retry after failure",
            ScheduleReason::JobInProgress => "job in progress",
            ScheduleReason::RuleModified => "rule modified",
            ScheduleReason::ManualTrigger => "manual trigger",
            ScheduleReason::Disabled => "rule disabled",
        };
        write!(f, "{s}")
    }
}

/// The outcome of a schedule calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleDecision {
    /// When the scheduler should next evaluate the rule
    pub next_at: DateTime<Utc>,
    /// Why that time was chosen
    pub reason: ScheduleReason,
}

// ============================================================================
// Calculation
// ============================================================================

/// Computes when `rule` should next be evaluated
///
/// `state` and `recent` are the rule's state record and most recent job as
/// currently persisted; both are `None` for a rule that has never been
/// scheduled. The function is pure: same inputs, same decision.
#[must_use]
pub fn next_execution(
    rule: &Rule,
    state: Option<&RuleState>,
    recent: Option<&Job>,
    now: DateTime<Utc>,
) -> ScheduleDecision {
    if !rule.is_enabled() {
        return ScheduleDecision {
            next_at: now + parked_window(),
            reason: ScheduleReason::Disabled,
        };
    }

    let recent = match (state, recent) {
        (Some(_), Some(job)) => job,
        // No state yet, or the state's job reference is gone (bulk clear)
        _ => {
            return ScheduleDecision {
                next_at: now,
                reason: ScheduleReason::InitialSchedule,
            }
        }
    };

    match recent.state() {
        JobState::DoneSuccess => {
            let age = rule
                .max_destination_age()
                .unwrap_or_else(default_max_destination_age);
            ScheduleDecision {
                next_at: recent.last_reported() + age,
                reason: ScheduleReason::MaxAgeExpired,
            }
        }
        JobState::DoneFailure => {
            let wait = rule.min_retry_time().unwrap_or_else(default_min_retry_time);
            ScheduleDecision {
                next_at: recent.last_reported() + wait,
                reason: ScheduleReason::RetryAfterFailure,
            }
        }
        JobState::Preparing | JobState::Ready | JobState::Executing => ScheduleDecision {
            next_at: now + parked_window(),
            reason: ScheduleReason::JobInProgress,
        },
    }
}

/// Returns true when the rule is due at `now`
#[must_use]
pub fn is_ready_to_execute(
    rule: &Rule,
    state: Option<&RuleState>,
    recent: Option<&Job>,
    now: DateTime<Utc>,
) -> bool {
    next_execution(rule, state, recent, now).next_at <= now
}

// ============================================================================
// Tests
// ============================================================================

//! Rule domain entity
//!
//! A rule is a user-defined freshness policy: "keep the destination endpoint
//! no older than N hours relative to the source endpoint". Rules never run
//! anything themselves; the scheduler turns due rules into [`Job`]s.
//!
//! Each rule has at most one [`RuleState`] side record, created lazily the
//! first time the scheduler produces a job for it. The state tracks the most
//! recent job and when the rule's result expires; it is mutated only by the
//! scheduler.
//!
//! [`Job`]: super::job::Job

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;
use super::newtypes::{EndpointId, JobId, RuleId, UserId};

// ============================================================================
// SyncOperation enum
// ============================================================================

/// The transfer operation a rule's jobs ask workers to perform
///
/// The core schedules and gates operations but never interprets them;
/// semantics belong to the external transfer tool the workers drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    /// Do nothing; useful for wiring tests and staged rollout
    #[default]
    Nop,
    /// One-way copy from source to destination
    Copy,
    /// Full synchronization, including deletions
    Sync,
}

impl SyncOperation {
    /// Returns the operation name as a string
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SyncOperation::Nop => "Nop",
            SyncOperation::Copy => "Copy",
            SyncOperation::Sync => "Sync",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOperation::Nop => write!(f, "nop"),
            SyncOperation::Copy => write!(f, "copy"),
            SyncOperation::Sync => write!(f, "sync"),
        }
    }
}

// ============================================================================
// Rule entity
// ============================================================================

/// A user-defined synchronization rule between two endpoints
///
/// Time parameters are stored as whole seconds; a value of zero means
/// "unset", in which case the schedule calculation falls back to its
/// built-in default (24 h destination age, 15 min retry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    id: RuleId,
    user_id: UserId,
    name: String,
    source_endpoint: EndpointId,
    destination_endpoint: EndpointId,
    operation: SyncOperation,
    /// Maximum tolerated destination age in seconds; 0 = default
    max_destination_age_secs: i64,
    /// Minimum wait before retrying a failed job in seconds; 0 = default
    min_retry_time_secs: i64,
    /// Maximum lag behind a source modification in seconds; 0 = unset.
    /// Persisted rule attribute, not consulted by the schedule calculation.
    max_time_after_source_modification_secs: i64,
    /// Optional fixed time-of-day trigger. Persisted rule attribute, not
    /// consulted by the schedule calculation.
    daily_trigger_time: Option<NaiveTime>,
    enabled: bool,
}

impl Rule {
    /// Creates a new enabled rule
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if the name is empty, source
    /// and destination are the same endpoint, or a duration is negative.
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        source_endpoint: EndpointId,
        destination_endpoint: EndpointId,
        operation: SyncOperation,
    ) -> Result<Self, DomainError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "Rule name cannot be empty".to_string(),
            ));
        }
        if source_endpoint == destination_endpoint {
            return Err(DomainError::ValidationFailed(
                "Rule source and destination must be different endpoints".to_string(),
            ));
        }

        Ok(Self {
            id: RuleId::new(),
            user_id,
            name,
            source_endpoint,
            destination_endpoint,
            operation,
            max_destination_age_secs: 0,
            min_retry_time_secs: 0,
            max_time_after_source_modification_secs: 0,
            daily_trigger_time: None,
            enabled: true,
        })
    }

    /// The rule's unique ID
    #[must_use]
    pub fn id(&self) -> &RuleId {
        &self.id
    }

    /// The owning user
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The endpoint jobs read from
    #[must_use]
    pub fn source_endpoint(&self) -> &EndpointId {
        &self.source_endpoint
    }

    /// The endpoint jobs write to
    #[must_use]
    pub fn destination_endpoint(&self) -> &EndpointId {
        &self.destination_endpoint
    }

    /// The transfer operation for this rule's jobs
    #[must_use]
    pub fn operation(&self) -> SyncOperation {
        self.operation
    }

    /// Maximum tolerated destination age; `None` when unset
    #[must_use]
    pub fn max_destination_age(&self) -> Option<Duration> {
        (self.max_destination_age_secs > 0)
            .then(|| Duration::seconds(self.max_destination_age_secs))
    }

    /// Minimum wait before retrying after a failure; `None` when unset
    #[must_use]
    pub fn min_retry_time(&self) -> Option<Duration> {
        (self.min_retry_time_secs > 0).then(|| Duration::seconds(self.min_retry_time_secs))
    }

    /// Maximum lag behind a source modification; `None` when unset
    #[must_use]
    pub fn max_time_after_source_modification(&self) -> Option<Duration> {
        (self.max_time_after_source_modification_secs > 0)
            .then(|| Duration::seconds(self.max_time_after_source_modification_secs))
    }

    /// Optional fixed time-of-day trigger
    #[must_use]
    pub fn daily_trigger_time(&self) -> Option<NaiveTime> {
        self.daily_trigger_time
    }

    /// Whether the scheduler considers this rule at all
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Renames the rule
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if the new name is empty.
    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "Rule name cannot be empty".to_string(),
            ));
        }
        self.name = name;
        Ok(())
    }

    /// Sets the transfer operation
    pub fn set_operation(&mut self, operation: SyncOperation) {
        self.operation = operation;
    }

    /// Sets the maximum destination age
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` on a negative duration.
    pub fn set_max_destination_age(&mut self, age: Duration) -> Result<(), DomainError> {
        if age < Duration::zero() {
            return Err(DomainError::ValidationFailed(
                "max_destination_age cannot be negative".to_string(),
            ));
        }
        self.max_destination_age_secs = age.num_seconds();
        Ok(())
    }

    /// Sets the minimum retry wait
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` on a negative duration.
    pub fn set_min_retry_time(&mut self, wait: Duration) -> Result<(), DomainError> {
        if wait < Duration::zero() {
            return Err(DomainError::ValidationFailed(
                "min_retry_time cannot be negative".to_string(),
            ));
        }
        self.min_retry_time_secs = wait.num_seconds();
        Ok(())
    }

    /// Sets the maximum lag behind a source modification
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` on a negative duration.
    pub fn set_max_time_after_source_modification(
        &mut self,
        lag: Duration,
    ) -> Result<(), DomainError> {
        if lag < Duration::zero() {
            return Err(DomainError::ValidationFailed(
                "max_time_after_source_modification cannot be negative".to_string(),
            ));
        }
        self.max_time_after_source_modification_secs = lag.num_seconds();
        Ok(())
    }

    /// Sets the optional daily trigger time
    pub fn set_daily_trigger_time(&mut self, at: Option<NaiveTime>) {
        self.daily_trigger_time = at;
    }

    /// Enables or disables the rule
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

// ============================================================================
// RuleState side record
// ============================================================================

/// Scheduler bookkeeping for a rule: the most recent job and when the
/// rule's last result expires
///
/// Exactly one `RuleState` exists per rule once the rule has been scheduled
/// at least once. The record is created lazily and mutated only by the
/// scheduler; everyone else reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleState {
    /// The rule this state belongs to
    pub rule_id: RuleId,
    /// When the most recent successful result stops being fresh
    pub expired_after: DateTime<Utc>,
    /// The last job produced for this rule, if any still exists
    pub recent_job: Option<JobId>,
}

impl RuleState {
    /// Creates a fresh state with no recent job
    #[must_use]
    pub fn new(rule_id: RuleId, now: DateTime<Utc>) -> Self {
        Self {
            rule_id,
            expired_after: now,
            recent_job: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> Rule {
        Rule::new(
            UserId::new(),
            "nightly backup",
            EndpointId::new(),
            EndpointId::new(),
            SyncOperation::Copy,
        )
        .unwrap()
    }

    #[test]
    fn test_new_rule_defaults() {
        let r = rule();
        assert!(r.is_enabled());
        assert_eq!(r.operation(), SyncOperation::Copy);
        assert!(r.max_destination_age().is_none());
        assert!(r.min_retry_time().is_none());
        assert!(r.daily_trigger_time().is_none());
    }

    #[test]
    fn test_same_endpoints_fail() {
        let endpoint = EndpointId::new();
        let result = Rule::new(
            UserId::new(),
            "broken",
            endpoint,
            endpoint,
            SyncOperation::Sync,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_name_fails() {
        let result = Rule::new(
            UserId::new(),
            "",
            EndpointId::new(),
            EndpointId::new(),
            SyncOperation::Nop,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unset_durations_read_as_none() {
        let mut r = rule();
        r.set_max_destination_age(Duration::zero()).unwrap();
        assert!(r.max_destination_age().is_none());
    }

    #[test]
    fn test_set_durations() {
        let mut r = rule();
        r.set_max_destination_age(Duration::hours(2)).unwrap();
        r.set_min_retry_time(Duration::minutes(5)).unwrap();
        assert_eq!(r.max_destination_age(), Some(Duration::hours(2)));
        assert_eq!(r.min_retry_time(), Some(Duration::minutes(5)));
    }

    #[test]
    fn test_negative_duration_fails() {
        let mut r = rule();
        assert!(r.set_max_destination_age(Duration::seconds(-1)).is_err());
        assert!(r.set_min_retry_time(Duration::seconds(-1)).is_err());
    }

    #[test]
    fn test_rename() {
        let mut r = rule();
        r.rename("weekly backup").unwrap();
        assert_eq!(r.name(), "weekly backup");
        assert!(r.rename("   ").is_err());
    }

    #[test]
    fn test_enable_disable() {
        let mut r = rule();
        r.set_enabled(false);
        assert!(!r.is_enabled());
        r.set_enabled(true);
        assert!(r.is_enabled());
    }

    #[test]
    fn test_rule_state_new() {
        let now = Utc::now();
        let state = RuleState::new(RuleId::new(), now);
        assert_eq!(state.expired_after, now);
        assert!(state.recent_job.is_none());
    }

    #[test]
    fn test_serde_roundtrip() {
        let r = rule();
        let json = serde_json::to_string(&r).unwrap();
        let parsed: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(r, parsed);
    }
}

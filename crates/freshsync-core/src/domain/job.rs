//! Job domain entity
//!
//! A job is one concrete, claimable instance of executing a rule's transfer
//! operation. The scheduler creates jobs in `Ready` state; exactly one
//! worker claims a job through the dispatch protocol (owner set, state
//! `Executing`), then drives it to a terminal state through report calls.
//!
//! ## State Machine
//!
//! ```text
//!  ┌───────────┐        ┌─────────┐   claim    ┌───────────┐
//!  │ Preparing │ ─────► │  Ready  │ ─────────► │ Executing │
//!  └───────────┘        └─────────┘            └───────────┘
//!                                                │  │   │
//!                              report success ───┘  │   └── heartbeat
//!                                                   │        (stays)
//!                      report failure / lease expiry│
//!                                                   ▼
//!                                   ┌─────────────┐   ┌─────────────┐
//!                                   │ DoneSuccess │   │ DoneFailure │
//!                                   └─────────────┘   └─────────────┘
//! ```
//!
//! An `Executing` job must be reported at least every 120 seconds (the
//! liveness lease); the dispatch engine forces unreported jobs to
//! `DoneFailure` before evaluating new candidates.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::endpoint::Endpoint;
use super::errors::DomainError;
use super::newtypes::{EndpointId, EndpointKey, JobId, UserId};
use super::rule::SyncOperation;

// ============================================================================
// JobState enum
// ============================================================================

/// Lifecycle state of a job
///
/// This is the canonical, exhaustive state set; there is no separate
/// partial-success terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Being assembled; not yet visible to workers
    Preparing,
    /// Claimable by any worker with matching capabilities
    #[default]
    Ready,
    /// Claimed by exactly one worker, heartbeating under the lease
    Executing,
    /// Terminal: the transfer failed or the worker's lease expired
    DoneFailure,
    /// Terminal: the transfer completed
    DoneSuccess,
}

impl JobState {
    /// Returns true for the two terminal states
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::DoneFailure | JobState::DoneSuccess)
    }

    /// Returns true while some worker may still act on the job
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns the state name as a string
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Preparing => "Preparing",
            JobState::Ready => "Ready",
            JobState::Executing => "Executing",
            JobState::DoneFailure => "DoneFailure",
            JobState::DoneSuccess => "DoneSuccess",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Preparing => write!(f, "preparing"),
            JobState::Ready => write!(f, "ready"),
            JobState::Executing => write!(f, "executing"),
            JobState::DoneFailure => write!(f, "done_failure"),
            JobState::DoneSuccess => write!(f, "done_success"),
        }
    }
}

// ============================================================================
// Job entity
// ============================================================================

/// One claimable unit of transfer work produced from a rule
///
/// Endpoint keys are denormalized onto the job so the dispatch engine can
/// run overlap checks without joining endpoints. Jobs are never deleted
/// automatically; history persists until an explicit bulk clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    user_id: UserId,
    /// Free-text label, typically the producing rule's name
    tag: String,
    source_endpoint: EndpointId,
    destination_endpoint: EndpointId,
    source_key: EndpointKey,
    destination_key: EndpointKey,
    operation: SyncOperation,
    /// Claiming worker; empty while unclaimed
    owner: String,
    state: JobState,
    /// When the job became due
    start_from: DateTime<Utc>,
    /// Advisory validity horizon; not enforced as a hard kill
    end_by: DateTime<Utc>,
    /// Last time the owning worker was heard from
    last_reported: DateTime<Utc>,
    /// Human-readable progress/outcome text
    status: String,
}

impl Job {
    /// Creates a new `Ready`, unclaimed job between two endpoints
    pub fn new(
        user_id: UserId,
        tag: impl Into<String>,
        source: &Endpoint,
        destination: &Endpoint,
        operation: SyncOperation,
        now: DateTime<Utc>,
        validity_window: Duration,
    ) -> Self {
        Self {
            id: JobId::new(),
            user_id,
            tag: tag.into(),
            source_endpoint: *source.id(),
            destination_endpoint: *destination.id(),
            source_key: source.key(),
            destination_key: destination.key(),
            operation,
            owner: String::new(),
            state: JobState::Ready,
            start_from: now,
            end_by: now + validity_window,
            last_reported: now,
            status: String::new(),
        }
    }

    /// The job's unique ID
    #[must_use]
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// The owning user
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Free-text label
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The endpoint the job reads from
    #[must_use]
    pub fn source_endpoint(&self) -> &EndpointId {
        &self.source_endpoint
    }

    /// The endpoint the job writes to
    #[must_use]
    pub fn destination_endpoint(&self) -> &EndpointId {
        &self.destination_endpoint
    }

    /// Resource key of the source endpoint
    #[must_use]
    pub fn source_key(&self) -> &EndpointKey {
        &self.source_key
    }

    /// Resource key of the destination endpoint
    #[must_use]
    pub fn destination_key(&self) -> &EndpointKey {
        &self.destination_key
    }

    /// The transfer operation
    #[must_use]
    pub fn operation(&self) -> SyncOperation {
        self.operation
    }

    /// The claiming worker; empty while unclaimed
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    /// When the job became due
    #[must_use]
    pub fn start_from(&self) -> DateTime<Utc> {
        self.start_from
    }

    /// Advisory validity horizon
    #[must_use]
    pub fn end_by(&self) -> DateTime<Utc> {
        self.end_by
    }

    /// Last time the owning worker was heard from
    #[must_use]
    pub fn last_reported(&self) -> DateTime<Utc> {
        self.last_reported
    }

    /// Human-readable progress/outcome text
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Returns true while no worker has claimed the job
    #[must_use]
    pub fn is_unclaimed(&self) -> bool {
        self.owner.is_empty()
    }

    /// Returns true when an `Executing` job has outlived its liveness lease
    #[must_use]
    pub fn lease_expired(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        self.state == JobState::Executing && now - self.last_reported > lease
    }

    // ------------------------------------------------------------------
    // State transitions
    // ------------------------------------------------------------------

    /// Marks a `Preparing` job claimable
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` unless the job is `Preparing`.
    pub fn make_ready(&mut self) -> Result<(), DomainError> {
        if self.state != JobState::Preparing {
            return Err(self.invalid_transition(JobState::Ready));
        }
        self.state = JobState::Ready;
        Ok(())
    }

    /// Claims the job for a worker: `Ready` → `Executing`
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` unless the job is `Ready` and
    /// unclaimed.
    pub fn claim(&mut self, owner: impl Into<String>, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.state != JobState::Ready || !self.is_unclaimed() {
            return Err(self.invalid_transition(JobState::Executing));
        }
        self.owner = owner.into();
        self.state = JobState::Executing;
        self.last_reported = now;
        Ok(())
    }

    /// Records a heartbeat: bumps `last_reported`, changes nothing else
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` unless the job is `Executing`.
    pub fn heartbeat(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.state != JobState::Executing {
            return Err(self.invalid_transition(JobState::Executing));
        }
        self.last_reported = now;
        Ok(())
    }

    /// Finishes the job successfully; the owner is cleared
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` unless the job is `Executing`.
    pub fn finish_success(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.state != JobState::Executing {
            return Err(self.invalid_transition(JobState::DoneSuccess));
        }
        self.state = JobState::DoneSuccess;
        self.owner.clear();
        self.last_reported = now;
        Ok(())
    }

    /// Finishes the job as failed; the owner is cleared
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` unless the job is `Executing`.
    pub fn finish_failure(
        &mut self,
        now: DateTime<Utc>,
        status: impl Into<String>,
    ) -> Result<(), DomainError> {
        if self.state != JobState::Executing {
            return Err(self.invalid_transition(JobState::DoneFailure));
        }
        self.state = JobState::DoneFailure;
        self.owner.clear();
        self.last_reported = now;
        self.status = status.into();
        Ok(())
    }

    /// Forces a lease-expired job to `DoneFailure`
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` unless the job is `Executing`.
    pub fn fail_lease_expired(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.finish_failure(now, "liveness lease expired without a report")
    }

    /// Updates the progress text
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    fn invalid_transition(&self, to: JobState) -> DomainError {
        DomainError::InvalidState {
            from: self.state.name().to_string(),
            to: to.name().to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

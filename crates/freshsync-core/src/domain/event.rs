//! Scheduler event set
//!
//! Tagged notifications fed into the rule scheduler from the
//! request-handling surface. Producers publish events through the
//! [`ISchedulerSink`](crate::ports::ISchedulerSink) port; publishing is
//! always non-blocking and followed by a best-effort, coalesced release of
//! the scheduler's wake signal.
//!
//! Events are a closed sum type dispatched by exhaustive pattern match;
//! adding a variant is a compile-visible change at every dispatch site.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::job::JobState;
use super::newtypes::{EndpointId, JobId, RuleId};

/// How a rule changed, carried by [`SchedulerEvent::RuleChanged`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleChangeKind {
    /// The rule was just created
    Created,
    /// An attribute of the rule changed
    Updated,
    /// The rule no longer exists
    Deleted,
    /// The rule was switched on
    Enabled,
    /// The rule was switched off
    Disabled,
}

impl fmt::Display for RuleChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleChangeKind::Created => "created",
            RuleChangeKind::Updated => "updated",
            RuleChangeKind::Deleted => "deleted",
            RuleChangeKind::Enabled => "enabled",
            RuleChangeKind::Disabled => "disabled",
        };
        write!(f, "{s}")
    }
}

/// A notification that may change what the scheduler does next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SchedulerEvent {
    /// A job reached a terminal state; the producing rule should be
    /// rescheduled from its new outcome
    JobCompleted {
        /// The finished job
        job_id: JobId,
        /// The rule that produced it
        rule_id: RuleId,
        /// The terminal state the job ended in
        final_state: JobState,
    },
    /// A bulk clear removed job history; affected rules lost their
    /// recent-job reference and should be rescheduled
    JobsDeleted {
        /// Rules whose recent job was among the deleted rows
        rule_ids: Vec<RuleId>,
    },
    /// A rule was created, updated, deleted, enabled, or disabled
    RuleChanged {
        /// The affected rule
        rule_id: RuleId,
        /// What happened to it
        change: RuleChangeKind,
    },
    /// Endpoint metadata changed; identity is immutable so schedules are
    /// unaffected, but the scheduler logs the update
    EndpointUpdated {
        /// The affected endpoint
        endpoint_id: EndpointId,
    },
    /// A user asked for a rule to run now, bypassing its schedule
    ManualTrigger {
        /// The rule to force-schedule
        rule_id: RuleId,
    },
}

impl SchedulerEvent {
    /// Short variant name for logging
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerEvent::JobCompleted { .. } => "JobCompleted",
            SchedulerEvent::JobsDeleted { .. } => "JobsDeleted",
            SchedulerEvent::RuleChanged { .. } => "RuleChanged",
            SchedulerEvent::EndpointUpdated { .. } => "EndpointUpdated",
            SchedulerEvent::ManualTrigger { .. } => "ManualTrigger",
        }
    }
}

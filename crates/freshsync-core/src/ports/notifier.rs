//! Notification and event-sink ports (driven/secondary ports)
//!
//! Two fire-and-forget fan-out seams:
//!
//! - [`IJobNotifier`] tells idle workers that a job may now be available.
//!   Sent whenever a job is created and whenever a running job completes
//!   (a completed job may free endpoints other waiting jobs need).
//! - [`ISchedulerSink`] feeds [`SchedulerEvent`]s into the rule scheduler
//!   from request-handling code. Publishing must never block the caller;
//!   implementations enqueue and return.
//!
//! Both are infallible by design: a lost notification only delays work
//! until the next wakeup, it never loses state.

use crate::domain::SchedulerEvent;

/// Port trait for telling workers a job may be available
pub trait IJobNotifier: Send + Sync {
    /// Broadcasts a "new job available" signal to all connected workers
    ///
    /// Best-effort; implementations log and continue when nobody listens.
    fn notify_jobs_available(&self);
}

/// Port trait for publishing events into the rule scheduler
pub trait ISchedulerSink: Send + Sync {
    /// Enqueues an event for the scheduler and releases its wake signal
    ///
    /// Non-blocking for the caller; multiple wakes coalesce into one
    /// pending wakeup while the scheduler sleeps.
    fn publish(&self, event: SchedulerEvent);
}

/// A notifier that drops every signal
///
/// Useful in tests and in tools that run the scheduler without workers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullJobNotifier;

impl IJobNotifier for NullJobNotifier {
    fn notify_jobs_available(&self) {}
}

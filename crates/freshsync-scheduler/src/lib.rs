//! Freshsync Scheduler - Rule evaluation and job creation
//!
//! This crate hosts the event-driven rule scheduler:
//!
//! - [`ScheduleQueue`] - versioned min-priority queue with lazy invalidation
//! - [`RuleScheduler`] - the single-consumer wakeup/evaluation loop
//! - [`SchedulerHandle`] - the non-blocking producer handle implementing
//!   the `ISchedulerSink` port
//! - [`BroadcastJobNotifier`] - broadcast fan-out implementing `IJobNotifier`
//!
//! Exactly one scheduler loop runs per process instance; it is the sole
//! writer of the queue and schedule map. Producers (rule mutations, job
//! reports) only touch the unbounded event channel and the coalesced wake
//! signal, so they never block.

pub mod notify;
pub mod queue;
pub mod scheduler;

pub use notify::{BroadcastJobNotifier, WorkerSignal};
pub use queue::{ScheduleQueue, ScheduledRule};
pub use scheduler::{RuleScheduler, SchedulerHandle};

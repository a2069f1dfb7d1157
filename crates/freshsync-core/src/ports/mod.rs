//! Port definitions (trait interfaces)
//!
//! Ports define the boundary between the domain core and its adapters:
//! persistence, worker notification, scheduler event ingestion, and time.

pub mod clock;
pub mod notifier;
pub mod state_repository;

pub use clock::{IClock, ManualClock, SystemClock};
pub use notifier::{IJobNotifier, ISchedulerSink, NullJobNotifier};
pub use state_repository::{IStateRepository, JobFilter};

//! Freshsync Dispatch - Worker-facing job acquisition
//!
//! This crate implements the pull-based acquisition and report protocol:
//!
//! - [`AccessMap`] - which endpoint keys live jobs read and write, with
//!   asymmetric reader/writer conflict semantics
//! - [`JobDispatcher`] - the acquire/report engine with lease enforcement
//!   and the optimistic, conditional job claim
//! - [`ReportStatus`] - accepted/rejected outcome of a report call
//!
//! Dispatcher calls are invoked concurrently by any number of independent
//! workers against the persistent store; conflict state is recomputed from
//! scratch on every call, and the at-most-one-claim property rests on the
//! store's conditional update, not on any in-process lock.

pub mod access;
pub mod dispatcher;

pub use access::{AccessKind, AccessMap};
pub use dispatcher::{JobDispatcher, ReportStatus};

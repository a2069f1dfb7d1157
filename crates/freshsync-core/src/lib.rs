//! Freshsync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Storage`, `Endpoint`, `Rule`, `RuleState`, `Job`
//! - **Schedule calculation** - the pure next-execution-time function that
//!   turns a rule and its most recent job outcome into a due time
//! - **Scheduler events** - the tagged notifications fed into the rule
//!   scheduler from the request-handling surface
//! - **Port definitions** - Traits for adapters: `IStateRepository`,
//!   `IJobNotifier`, `ISchedulerSink`, `IClock`
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no runtime
//! dependencies. Ports define trait interfaces that adapter crates implement:
//! `freshsync-store` persists the entities, `freshsync-scheduler` drives the
//! evaluation loop, and `freshsync-dispatch` implements the worker-facing
//! acquisition protocol.

pub mod config;
pub mod domain;
pub mod ports;

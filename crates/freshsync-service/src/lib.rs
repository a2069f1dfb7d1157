//! Freshsync Service - Logical operations facade
//!
//! The transport-agnostic surface a request-handling layer (RPC, HTTP,
//! anything) calls into:
//!
//! - [`RuleService`] - rule CRUD, enable/disable, manual trigger, bulk job
//!   deletion; every mutation emits the matching `SchedulerEvent`
//! - [`CatalogService`] - storage and endpoint registration and the one
//!   mutable piece of endpoint metadata
//!
//! No wire format lives here; callers bring their own transport and
//! authentication and hand this crate already-authenticated identities.

pub mod catalog;
pub mod rules;

pub use catalog::CatalogService;
pub use rules::RuleService;

//! State repository port (driven/secondary port)
//!
//! This module defines the interface for persisting and querying rules,
//! rule states, jobs, endpoints, and storages.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory, etc.) and don't need domain-level classification.
//! - Expected absence is `Ok(None)`, never an error; errors mean the store
//!   itself failed.
//! - [`claim_job`](IStateRepository::claim_job) is the one operation with
//!   concurrency semantics: it must be a conditional update that succeeds
//!   for at most one caller per job, because acquisition calls run
//!   concurrently against the store with no cross-call lock.

use chrono::{DateTime, Utc};

use crate::domain::{
    job::JobState,
    newtypes::{EndpointId, JobId, RuleId, StorageId, UserId},
    Endpoint, Job, Rule, RuleState, Storage,
};

// ============================================================================
// JobFilter struct
// ============================================================================

/// Filter criteria for querying jobs
///
/// All fields are optional; when `None`/`false`, no filtering is applied
/// for that field. Multiple filters are combined with AND logic. Results
/// are always ordered by `start_from` ascending with the job id as a
/// deterministic tie-break (oldest-due-first, FIFO).
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Filter by job state
    pub state: Option<JobState>,
    /// Filter by owning user
    pub user_id: Option<UserId>,
    /// Only jobs with no owner
    pub unclaimed_only: bool,
}

impl JobFilter {
    /// Creates a new empty filter (matches all jobs)
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state filter
    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the owning-user filter
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Restricts to unclaimed jobs
    pub fn unclaimed(mut self) -> Self {
        self.unclaimed_only = true;
        self
    }
}

// ============================================================================
// IStateRepository trait
// ============================================================================

/// Port trait for persistent state storage
///
/// This is the primary interface for all persistence operations in
/// Freshsync. It covers CRUD for every domain entity plus the two
/// operations with scheduling semantics: the conditional job claim and the
/// bulk job clear.
///
/// ## Implementation Notes
///
/// - Save operations are UPSERTs keyed on the entity id.
/// - Implementations should ensure atomicity for individual operations.
/// - `claim_job` must guard on `state = Ready AND owner = ''` in the same
///   statement that writes the new owner; a lost race returns `false`, not
///   an error.
#[async_trait::async_trait]
pub trait IStateRepository: Send + Sync {
    // --- Storage operations ---

    /// Saves a storage (insert or update)
    async fn save_storage(&self, storage: &Storage) -> anyhow::Result<()>;

    /// Retrieves a storage by its ID
    async fn get_storage(&self, id: &StorageId) -> anyhow::Result<Option<Storage>>;

    // --- Endpoint operations ---

    /// Saves an endpoint (insert or update)
    async fn save_endpoint(&self, endpoint: &Endpoint) -> anyhow::Result<()>;

    /// Retrieves an endpoint by its ID
    async fn get_endpoint(&self, id: &EndpointId) -> anyhow::Result<Option<Endpoint>>;

    // --- Rule operations ---

    /// Saves a rule (insert or update)
    async fn save_rule(&self, rule: &Rule) -> anyhow::Result<()>;

    /// Retrieves a rule by its ID
    async fn get_rule(&self, id: &RuleId) -> anyhow::Result<Option<Rule>>;

    /// Retrieves every rule in the store
    ///
    /// Used by the scheduler at startup to rebuild its queue.
    async fn list_rules(&self) -> anyhow::Result<Vec<Rule>>;

    /// Retrieves all rules owned by a user
    async fn list_rules_for_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Rule>>;

    /// Deletes a rule and its state record
    async fn delete_rule(&self, id: &RuleId) -> anyhow::Result<()>;

    // --- RuleState operations ---

    /// Saves a rule state (insert or update)
    async fn save_rule_state(&self, state: &RuleState) -> anyhow::Result<()>;

    /// Retrieves the state record for a rule
    async fn get_rule_state(&self, rule_id: &RuleId) -> anyhow::Result<Option<RuleState>>;

    /// Finds the rule state whose recent job is `job_id`
    ///
    /// Used by the dispatch engine to route a job completion back to the
    /// rule that produced it.
    async fn get_rule_state_by_recent_job(
        &self,
        job_id: &JobId,
    ) -> anyhow::Result<Option<RuleState>>;

    // --- Job operations ---

    /// Saves a job (insert or update)
    async fn save_job(&self, job: &Job) -> anyhow::Result<()>;

    /// Retrieves a job by its ID
    async fn get_job(&self, id: &JobId) -> anyhow::Result<Option<Job>>;

    /// Queries jobs matching the given filter, oldest-due-first
    async fn list_jobs(&self, filter: &JobFilter) -> anyhow::Result<Vec<Job>>;

    /// Atomically claims a `Ready`, unclaimed job for a worker
    ///
    /// Performs the conditional update `owner = caller, state = Executing,
    /// last_reported = now` guarded on `state = Ready AND owner = ''`.
    /// Returns `true` when this caller won the claim, `false` when another
    /// caller got there first (or the job changed state meanwhile).
    async fn claim_job(
        &self,
        id: &JobId,
        owner: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    /// Bulk-clears all job history for a user
    ///
    /// Also detaches the deleted jobs from any rule state referencing them,
    /// so affected rules reschedule from scratch. Returns the number of
    /// deleted jobs.
    async fn delete_jobs_for_user(&self, user_id: &UserId) -> anyhow::Result<u64>;
}

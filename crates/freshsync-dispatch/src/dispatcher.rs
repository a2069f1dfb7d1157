//! Job acquisition and report protocol
//!
//! The [`JobDispatcher`] is the worker-facing half of the system: pull-based
//! workers call [`acquire_next_job`] to claim work and [`report_job`] to
//! heartbeat and finish it.
//!
//! ## Acquisition
//!
//! 1. Load all Ready, unclaimed jobs oldest-due-first.
//! 2. Load all Executing jobs; force any whose liveness lease has lapsed to
//!    `DoneFailure` (persisted before candidates are considered), and build
//!    the [`AccessMap`] from the survivors.
//! 3. Scan candidates in order, skipping any the caller lacks capabilities
//!    for, cannot reach, or that would overlap live endpoint access.
//! 4. Claim the first survivor through the store's conditional update. A
//!    lost race moves on to the next candidate; it is never an error.
//!
//! Everything is recomputed from persisted rows on every call: there is no
//! cross-call lock, and the conditional claim alone guarantees that a job
//! is handed to at most one worker.
//!
//! [`acquire_next_job`]: JobDispatcher::acquire_next_job
//! [`report_job`]: JobDispatcher::report_job

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use freshsync_core::config::DispatchConfig;
use freshsync_core::domain::{
    job::JobState,
    newtypes::{JobId, StorageId},
    Job, SchedulerEvent, Storage,
};
use freshsync_core::ports::{IClock, IJobNotifier, ISchedulerSink, IStateRepository, JobFilter};

use crate::access::AccessMap;

// ============================================================================
// ReportStatus
// ============================================================================

/// Outcome of a report call
///
/// `Rejected` is the restart-tolerant answer to stale or duplicate reports:
/// a worker that restarts and reports a job it no longer owns gets a
/// negative status, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    /// The report was applied
    Accepted,
    /// The report did not match a live, owned job and was ignored
    Rejected,
}

impl ReportStatus {
    /// Wire representation: `0` accepted, `-1` rejected
    #[must_use]
    pub fn as_code(&self) -> i32 {
        match self {
            ReportStatus::Accepted => 0,
            ReportStatus::Rejected => -1,
        }
    }
}

// ============================================================================
// JobDispatcher
// ============================================================================

/// Worker-facing acquisition/report engine
///
/// Stateless between calls; any number of dispatcher calls may run
/// concurrently against the shared store.
pub struct JobDispatcher {
    repo: Arc<dyn IStateRepository>,
    notifier: Arc<dyn IJobNotifier>,
    scheduler: Arc<dyn ISchedulerSink>,
    clock: Arc<dyn IClock>,
    /// Liveness lease: an Executing job unreported for longer is presumed dead
    lease: Duration,
}

impl JobDispatcher {
    /// Creates a dispatcher with the configured lease window
    pub fn new(
        repo: Arc<dyn IStateRepository>,
        notifier: Arc<dyn IJobNotifier>,
        scheduler: Arc<dyn ISchedulerSink>,
        clock: Arc<dyn IClock>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            repo,
            notifier,
            scheduler,
            clock,
            lease: Duration::seconds(config.lease_secs as i64),
        }
    }

    // ========================================================================
    // Acquisition
    // ========================================================================

    /// Hands the caller the first Ready job it may safely execute
    ///
    /// `capabilities` is the set of storage URI schemes the worker can
    /// handle; `network` is the worker's locality tag. Returns `Ok(None)`
    /// when nothing is acquirable right now - a routine empty result, not
    /// a fault.
    pub async fn acquire_next_job(
        &self,
        owner: &str,
        capabilities: &HashSet<String>,
        network: &str,
    ) -> Result<Option<Job>> {
        let now = self.clock.now();

        // Oldest-due-first candidate list
        let candidates = self
            .repo
            .list_jobs(&JobFilter::new().with_state(JobState::Ready).unclaimed())
            .await
            .context("Failed to load ready jobs")?;

        let access = self.build_access_map(now).await?;

        let mut storages: HashMap<StorageId, Option<Storage>> = HashMap::new();

        for candidate in candidates {
            let Some(source_storage) = self
                .storage_of(&mut storages, candidate.source_key())
                .await?
            else {
                warn!(job_id = %candidate.id(), "Candidate references unknown source storage, skipping");
                continue;
            };
            let Some(destination_storage) = self
                .storage_of(&mut storages, candidate.destination_key())
                .await?
            else {
                warn!(job_id = %candidate.id(), "Candidate references unknown destination storage, skipping");
                continue;
            };

            // Capability gate: the worker must speak both schemes
            if !capabilities.contains(source_storage.scheme())
                || !capabilities.contains(destination_storage.scheme())
            {
                debug!(job_id = %candidate.id(), "Skipping candidate: missing capability");
                continue;
            }

            // Network gate: a tagged storage requires a matching caller
            if !source_storage.reachable_from(network)
                || !destination_storage.reachable_from(network)
            {
                debug!(job_id = %candidate.id(), "Skipping candidate: network tag mismatch");
                continue;
            }

            // Sources share with readers but never with writers
            if access.blocks_read(candidate.source_key()) {
                debug!(
                    job_id = %candidate.id(),
                    key = %candidate.source_key(),
                    "Skipping candidate: source overlaps a live write"
                );
                continue;
            }

            // Destinations are always exclusive
            if access.blocks_write(candidate.destination_key()) {
                debug!(
                    job_id = %candidate.id(),
                    key = %candidate.destination_key(),
                    "Skipping candidate: destination overlaps live access"
                );
                continue;
            }

            // Conditional claim; losing the race just moves to the next
            // candidate
            if !self
                .repo
                .claim_job(candidate.id(), owner, now)
                .await
                .context("Failed to claim job")?
            {
                debug!(job_id = %candidate.id(), "Lost claim race, trying next candidate");
                continue;
            }

            let mut job = candidate;
            job.claim(owner, now)
                .context("Claimed job was not in Ready state")?;

            info!(
                job_id = %job.id(),
                owner,
                operation = %job.operation(),
                source = %job.source_key(),
                destination = %job.destination_key(),
                "Job acquired"
            );
            return Ok(Some(job));
        }

        debug!(owner, "No job available");
        Ok(None)
    }

    /// Builds the live access map, enforcing the lease on the way
    ///
    /// Every Executing job past its lease is forced to `DoneFailure` and
    /// persisted before candidate evaluation, freeing its endpoints; the
    /// rest contribute their source key as Reading and destination key as
    /// Writing.
    async fn build_access_map(&self, now: DateTime<Utc>) -> Result<AccessMap> {
        let executing = self
            .repo
            .list_jobs(&JobFilter::new().with_state(JobState::Executing))
            .await
            .context("Failed to load executing jobs")?;

        let mut access = AccessMap::new();

        for mut job in executing {
            if job.lease_expired(now, self.lease) {
                warn!(
                    job_id = %job.id(),
                    owner = job.owner(),
                    last_reported = %job.last_reported(),
                    "Executing job exceeded its liveness lease, forcing failure"
                );
                job.fail_lease_expired(now)
                    .context("Lease-expired job was not Executing")?;
                self.repo
                    .save_job(&job)
                    .await
                    .context("Failed to persist lease timeout")?;
                self.finish_notifications(&job).await?;
                continue;
            }

            access.record_read(job.source_key().clone());
            access.record_write(job.destination_key().clone());
        }

        Ok(access)
    }

    /// Resolves the storage an endpoint key belongs to, memoized per call
    async fn storage_of(
        &self,
        cache: &mut HashMap<StorageId, Option<Storage>>,
        key: &freshsync_core::domain::newtypes::EndpointKey,
    ) -> Result<Option<Storage>> {
        // The storage id is the key's prefix up to the separator
        let id_str = key.as_str().split(':').next().unwrap_or_default();
        let storage_id: StorageId = match id_str.parse() {
            Ok(id) => id,
            Err(_) => return Ok(None),
        };

        if let Some(cached) = cache.get(&storage_id) {
            return Ok(cached.clone());
        }

        let storage = self.repo.get_storage(&storage_id).await?;
        cache.insert(storage_id, storage.clone());
        Ok(storage)
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Applies a worker's report for a job it claims to own
    ///
    /// - `Executing` is a heartbeat: only `last_reported` moves.
    /// - `DoneSuccess` / `DoneFailure` finish the job, clear the owner, and
    ///   fan out the completion (scheduler event + worker notification).
    ///
    /// Reports for unknown jobs, non-Executing jobs, or mismatched owners
    /// return [`ReportStatus::Rejected`] - logged, never fatal, so a
    /// restarted worker repeating an old report cannot crash the caller.
    pub async fn report_job(
        &self,
        job_id: &JobId,
        owner: &str,
        reported: JobState,
    ) -> Result<ReportStatus> {
        let now = self.clock.now();

        let Some(mut job) = self
            .repo
            .get_job(job_id)
            .await
            .context("Failed to load reported job")?
        else {
            warn!(job_id = %job_id, owner, "Report for unknown job, rejecting");
            return Ok(ReportStatus::Rejected);
        };

        if job.state() != JobState::Executing {
            warn!(
                job_id = %job_id,
                owner,
                state = %job.state(),
                "Report for non-executing job, rejecting"
            );
            return Ok(ReportStatus::Rejected);
        }
        if job.owner() != owner {
            warn!(
                job_id = %job_id,
                expected = job.owner(),
                actual = owner,
                "Report owner mismatch, rejecting"
            );
            return Ok(ReportStatus::Rejected);
        }

        match reported {
            JobState::Executing => {
                job.heartbeat(now).context("Heartbeat on non-executing job")?;
                self.repo
                    .save_job(&job)
                    .await
                    .context("Failed to persist heartbeat")?;
                debug!(job_id = %job_id, owner, "Heartbeat recorded");
            }
            JobState::DoneSuccess => {
                job.finish_success(now).context("Finish on non-executing job")?;
                self.repo
                    .save_job(&job)
                    .await
                    .context("Failed to persist job success")?;
                info!(job_id = %job_id, owner, "Job finished successfully");
                self.finish_notifications(&job).await?;
            }
            JobState::DoneFailure => {
                job.finish_failure(now, "worker reported failure")
                    .context("Finish on non-executing job")?;
                self.repo
                    .save_job(&job)
                    .await
                    .context("Failed to persist job failure")?;
                info!(job_id = %job_id, owner, "Job finished with failure");
                self.finish_notifications(&job).await?;
            }
            JobState::Preparing | JobState::Ready => {
                warn!(
                    job_id = %job_id,
                    owner,
                    reported = %reported,
                    "Report names a state workers cannot set, rejecting"
                );
                return Ok(ReportStatus::Rejected);
            }
        }

        Ok(ReportStatus::Accepted)
    }

    /// Fans out a job completion: scheduler event plus worker notification
    ///
    /// A finished job may free endpoints or capacity other waiting jobs
    /// need, so workers are poked even on failure.
    async fn finish_notifications(&self, job: &Job) -> Result<()> {
        match self
            .repo
            .get_rule_state_by_recent_job(job.id())
            .await
            .context("Failed to resolve producing rule")?
        {
            Some(state) => {
                self.scheduler.publish(SchedulerEvent::JobCompleted {
                    job_id: *job.id(),
                    rule_id: state.rule_id,
                    final_state: job.state(),
                });
            }
            None => {
                debug!(
                    job_id = %job.id(),
                    "Finished job is no rule's recent job, no completion event"
                );
            }
        }

        self.notifier.notify_jobs_available();
        Ok(())
    }
}

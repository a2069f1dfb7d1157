//! Rule scheduler - turns due rules into claimable jobs
//!
//! The [`RuleScheduler`] owns the priority queue of pending rule
//! evaluations, the wakeup/event loop, and job creation. It is the single
//! consumer of its queue and event channel; request-handling code talks to
//! it only through the cloneable [`SchedulerHandle`].
//!
//! ## Flow
//!
//! ```text
//! rule mutation / job report ──→ SchedulerHandle ──→ event channel ─┐
//!                                      │                            │
//!                                 wake signal                       ▼
//!                                      │                      RuleScheduler
//!                                      └──────────────────────► run loop
//!                                                                   │
//!                                              due rule ──→ Ready Job + notify
//! ```
//!
//! The wake signal is a `tokio::sync::Notify`: a signal sent while the
//! consumer is busy is stored as a single permit, so any number of
//! concurrent publishes coalesce into one pending wakeup. Publishing never
//! blocks the producer.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use freshsync_core::config::SchedulerConfig;
use freshsync_core::domain::{
    newtypes::RuleId,
    schedule::{default_max_destination_age, default_min_retry_time},
    next_execution, Job, Rule, RuleChangeKind, RuleState, ScheduleDecision, ScheduleReason,
    SchedulerEvent,
};
use freshsync_core::ports::{IClock, IJobNotifier, ISchedulerSink, IStateRepository};

use crate::queue::{ScheduleQueue, ScheduledRule};

// ============================================================================
// SchedulerHandle
// ============================================================================

/// Cloneable producer half of the scheduler
///
/// Held by the service facade and the dispatch engine. [`publish`] enqueues
/// an event on the unbounded channel and releases the coalesced wake
/// signal; it never blocks and never fails (a scheduler that has shut down
/// simply drops the event).
///
/// [`publish`]: ISchedulerSink::publish
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    events: mpsc::UnboundedSender<SchedulerEvent>,
    wake: Arc<Notify>,
}

impl ISchedulerSink for SchedulerHandle {
    fn publish(&self, event: SchedulerEvent) {
        debug!(event = event.name(), "Publishing scheduler event");
        if self.events.send(event).is_err() {
            warn!("Scheduler event dropped: scheduler is no longer running");
            return;
        }
        // Best-effort, idempotent: an already-pending wakeup is not duplicated
        self.wake.notify_one();
    }
}

// ============================================================================
// RuleScheduler
// ============================================================================

/// The rule evaluation loop: one instance, one consumer task per process
pub struct RuleScheduler {
    repo: Arc<dyn IStateRepository>,
    notifier: Arc<dyn IJobNotifier>,
    clock: Arc<dyn IClock>,
    config: SchedulerConfig,
    queue: ScheduleQueue,
    events: mpsc::UnboundedReceiver<SchedulerEvent>,
    wake: Arc<Notify>,
}

impl RuleScheduler {
    /// Creates a scheduler and the handle producers use to reach it
    pub fn new(
        repo: Arc<dyn IStateRepository>,
        notifier: Arc<dyn IJobNotifier>,
        clock: Arc<dyn IClock>,
        config: SchedulerConfig,
    ) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let wake = Arc::new(Notify::new());

        if !config.job_creation_enabled {
            info!("Scheduler running in dry-run mode: due rules will be logged, not executed");
        }

        let scheduler = Self {
            repo,
            notifier,
            clock,
            config,
            queue: ScheduleQueue::new(),
            events: rx,
            wake: Arc::clone(&wake),
        };
        let handle = SchedulerHandle { events: tx, wake };

        (scheduler, handle)
    }

    /// Loads every rule and its state, computing the initial schedule
    ///
    /// Returns the number of rules scheduled. Called once before the loop;
    /// also usable directly by tests to set up a deterministic queue.
    pub async fn bootstrap(&mut self) -> Result<usize> {
        let now = self.clock.now();
        let rules = self
            .repo
            .list_rules()
            .await
            .context("Failed to load rules at startup")?;

        for rule in &rules {
            let (state, recent) = self.load_state(rule).await?;
            let decision = next_execution(rule, state.as_ref(), recent.as_ref(), now);
            self.queue
                .schedule(*rule.id(), decision.next_at, decision.reason);
            debug!(
                rule_id = %rule.id(),
                next_at = %decision.next_at,
                reason = %decision.reason,
                "Scheduled rule at startup"
            );
        }

        info!(rules = rules.len(), "Scheduler bootstrap complete");
        Ok(rules.len())
    }

    /// Main loop: evaluate due rules, drain events, sleep until woken
    ///
    /// Runs until `shutdown` fires. A failed pass is logged and followed by
    /// a short pause; the loop never terminates on its own.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Rule scheduler starting");

        // Startup load; retry until it succeeds so a slow database does not
        // kill the process
        while let Err(err) = self.bootstrap().await {
            error!(error = %format!("{err:#}"), "Scheduler bootstrap failed, retrying");
            if self.pause_after_error(&shutdown).await {
                return;
            }
        }

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if let Err(err) = self.run_pass().await {
                error!(error = %format!("{err:#}"), "Scheduler pass failed");
                if self.pause_after_error(&shutdown).await {
                    break;
                }
                continue;
            }

            if self.wait_for_work(&shutdown).await {
                break;
            }
        }

        info!("Rule scheduler stopped");
    }

    /// One pass: handle everything due now, then drain pending events
    ///
    /// Public so scenario tests can drive the scheduler with a manual clock
    /// instead of waiting on real timers.
    pub async fn run_pass(&mut self) -> Result<usize> {
        let now = self.clock.now();

        let due = self.queue.pop_due(now);
        let due_count = due.len();
        for entry in due {
            // One broken rule must not starve the rest of the pass
            if let Err(err) = self.evaluate_rule(&entry, now).await {
                warn!(
                    rule_id = %entry.rule_id,
                    error = %format!("{err:#}"),
                    "Rule evaluation failed"
                );
                self.queue.schedule(
                    entry.rule_id,
                    now + default_min_retry_time(),
                    ScheduleReason::RetryAfterFailure,
                );
            }
        }

        let drained = self.drain_events(now).await;
        if due_count > 0 || drained > 0 {
            debug!(due = due_count, events = drained, "Scheduler pass complete");
        }

        Ok(due_count)
    }

    // ========================================================================
    // Rule evaluation and job creation
    // ========================================================================

    /// Re-checks a due rule against the store and creates its job
    ///
    /// The re-fetch and readiness double-check defend against races during
    /// the sleep: the rule may have been deleted, disabled, or satisfied by
    /// a manual trigger while its queue entry aged.
    async fn evaluate_rule(&mut self, entry: &ScheduledRule, now: DateTime<Utc>) -> Result<()> {
        let rule_id = entry.rule_id;

        let Some(rule) = self.repo.get_rule(&rule_id).await? else {
            debug!(rule_id = %rule_id, "Due rule no longer exists, dropping");
            self.queue.remove(&rule_id);
            return Ok(());
        };

        let (state, recent) = self.load_state(&rule).await?;

        let ready = if entry.reason == ScheduleReason::ManualTrigger {
            // A manual trigger bypasses the time arithmetic but still
            // refuses to stack a second job on a live one
            rule.is_enabled()
                && !recent
                    .as_ref()
                    .is_some_and(|job| job.state().is_live())
        } else {
            freshsync_core::domain::is_ready_to_execute(
                &rule,
                state.as_ref(),
                recent.as_ref(),
                now,
            )
        };

        if !ready {
            let decision = next_execution(&rule, state.as_ref(), recent.as_ref(), now);
            debug!(
                rule_id = %rule_id,
                next_at = %decision.next_at,
                reason = %decision.reason,
                "Due rule no longer ready, rescheduled"
            );
            self.queue
                .schedule(rule_id, decision.next_at, decision.reason);
            return Ok(());
        }

        if self.config.job_creation_enabled {
            self.create_job(&rule, state, now).await?;
        } else {
            // Dry-run: log the would-be job and check again a full freshness
            // window later
            let age = rule
                .max_destination_age()
                .unwrap_or_else(default_max_destination_age);
            info!(
                rule_id = %rule_id,
                rule = rule.name(),
                operation = %rule.operation(),
                source = %rule.source_endpoint(),
                destination = %rule.destination_endpoint(),
                "Dry-run: job creation disabled, would have created a job"
            );
            self.queue
                .schedule(rule_id, now + age, ScheduleReason::MaxAgeExpired);
        }

        Ok(())
    }

    /// Creates the Ready job for a due rule and parks the rule behind it
    async fn create_job(
        &mut self,
        rule: &Rule,
        state: Option<RuleState>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let source = self
            .repo
            .get_endpoint(rule.source_endpoint())
            .await?
            .with_context(|| format!("Source endpoint missing for rule {}", rule.id()))?;
        let destination = self
            .repo
            .get_endpoint(rule.destination_endpoint())
            .await?
            .with_context(|| format!("Destination endpoint missing for rule {}", rule.id()))?;

        let window = Duration::hours(self.config.job_window_hours as i64);
        let job = Job::new(
            *rule.user_id(),
            rule.name(),
            &source,
            &destination,
            rule.operation(),
            now,
            window,
        );
        self.repo
            .save_job(&job)
            .await
            .context("Failed to persist new job")?;

        let mut state = state.unwrap_or_else(|| RuleState::new(*rule.id(), now));
        state.recent_job = Some(*job.id());
        state.expired_after = now
            + rule
                .max_destination_age()
                .unwrap_or_else(default_max_destination_age);
        self.repo
            .save_rule_state(&state)
            .await
            .context("Failed to persist rule state")?;

        info!(
            rule_id = %rule.id(),
            job_id = %job.id(),
            operation = %job.operation(),
            source = %job.source_key(),
            destination = %job.destination_key(),
            "Created job for due rule"
        );

        self.notifier.notify_jobs_available();

        // The new job parks the rule until its completion event arrives
        let decision = next_execution(rule, Some(&state), Some(&job), now);
        self.queue
            .schedule(*rule.id(), decision.next_at, decision.reason);

        Ok(())
    }

    // ========================================================================
    // Event dispatch
    // ========================================================================

    /// Drains the event channel without blocking; returns how many ran
    async fn drain_events(&mut self, now: DateTime<Utc>) -> usize {
        let mut drained = 0;
        while let Ok(event) = self.events.try_recv() {
            drained += 1;
            if let Err(err) = self.dispatch_event(event, now).await {
                warn!(error = %format!("{err:#}"), "Event dispatch failed");
            }
        }
        drained
    }

    /// Applies one event to the schedule
    async fn dispatch_event(&mut self, event: SchedulerEvent, now: DateTime<Utc>) -> Result<()> {
        debug!(event = event.name(), "Dispatching scheduler event");

        match event {
            SchedulerEvent::JobCompleted {
                job_id,
                rule_id,
                final_state,
            } => {
                debug!(job_id = %job_id, rule_id = %rule_id, state = %final_state, "Job completed");
                self.reschedule_from_store(&rule_id, now, None).await
            }
            SchedulerEvent::JobsDeleted { rule_ids } => {
                for rule_id in rule_ids {
                    self.reschedule_from_store(&rule_id, now, None).await?;
                }
                Ok(())
            }
            SchedulerEvent::RuleChanged { rule_id, change } => match change {
                RuleChangeKind::Deleted => {
                    self.queue.remove(&rule_id);
                    debug!(rule_id = %rule_id, "Removed deleted rule from schedule");
                    Ok(())
                }
                RuleChangeKind::Created => {
                    self.reschedule_from_store(&rule_id, now, None).await
                }
                RuleChangeKind::Updated | RuleChangeKind::Enabled | RuleChangeKind::Disabled => {
                    self.reschedule_from_store(&rule_id, now, Some(ScheduleReason::RuleModified))
                        .await
                }
            },
            SchedulerEvent::EndpointUpdated { endpoint_id } => {
                // Endpoint identity is immutable; a metadata edit never
                // changes any schedule
                debug!(endpoint_id = %endpoint_id, "Endpoint metadata updated");
                Ok(())
            }
            SchedulerEvent::ManualTrigger { rule_id } => {
                info!(rule_id = %rule_id, "Manual trigger, force-scheduling now");
                self.queue
                    .schedule(rule_id, now, ScheduleReason::ManualTrigger);
                Ok(())
            }
        }
    }

    /// Recomputes a rule's schedule from fresh store reads
    ///
    /// `reason_override` replaces the calculator's reason when the computed
    /// time is due-or-past (used for rule-modification events); parked
    /// decisions keep their own reason.
    async fn reschedule_from_store(
        &mut self,
        rule_id: &RuleId,
        now: DateTime<Utc>,
        reason_override: Option<ScheduleReason>,
    ) -> Result<()> {
        let Some(rule) = self.repo.get_rule(rule_id).await? else {
            self.queue.remove(rule_id);
            return Ok(());
        };

        let (state, recent) = self.load_state(&rule).await?;
        let mut decision: ScheduleDecision =
            next_execution(&rule, state.as_ref(), recent.as_ref(), now);

        if let Some(reason) = reason_override {
            if decision.next_at <= now {
                decision.reason = reason;
            }
        }

        debug!(
            rule_id = %rule_id,
            next_at = %decision.next_at,
            reason = %decision.reason,
            "Rescheduled rule"
        );
        self.queue
            .schedule(*rule_id, decision.next_at, decision.reason);
        Ok(())
    }

    /// Loads a rule's state record and its recent job, if either exists
    async fn load_state(&self, rule: &Rule) -> Result<(Option<RuleState>, Option<Job>)> {
        let state = self.repo.get_rule_state(rule.id()).await?;
        let recent = match state.as_ref().and_then(|s| s.recent_job) {
            Some(job_id) => self.repo.get_job(&job_id).await?,
            None => None,
        };
        Ok((state, recent))
    }

    // ========================================================================
    // Waiting
    // ========================================================================

    /// Sleeps until the earliest due time or the wake signal
    ///
    /// Returns true when the shutdown token fired.
    async fn wait_for_work(&mut self, shutdown: &CancellationToken) -> bool {
        match self.queue.next_due_at() {
            Some(at) => {
                let now = self.clock.now();
                let sleep_for = (at - now).to_std().unwrap_or(std::time::Duration::ZERO);
                tokio::select! {
                    _ = shutdown.cancelled() => true,
                    _ = self.wake.notified() => false,
                    _ = tokio::time::sleep(sleep_for) => false,
                }
            }
            None => {
                // Empty queue: only an event can make work appear
                tokio::select! {
                    _ = shutdown.cancelled() => true,
                    _ = self.wake.notified() => false,
                }
            }
        }
    }

    /// Pauses briefly after a failed pass; returns true on shutdown
    async fn pause_after_error(&self, shutdown: &CancellationToken) -> bool {
        let pause = std::time::Duration::from_secs(self.config.error_pause_secs);
        tokio::select! {
            _ = shutdown.cancelled() => true,
            _ = tokio::time::sleep(pause) => false,
        }
    }

    /// The authoritative in-memory schedule for a rule, if any
    ///
    /// Test and introspection helper; the queue itself stays private.
    #[must_use]
    pub fn scheduled(&self, rule_id: &RuleId) -> Option<ScheduledRule> {
        self.queue.get(rule_id).copied()
    }

    /// Number of rules currently scheduled
    #[must_use]
    pub fn scheduled_count(&self) -> usize {
        self.queue.len()
    }
}

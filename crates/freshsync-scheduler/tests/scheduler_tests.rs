//! Scenario tests for the rule scheduler
//!
//! These tests drive scheduler passes directly against an in-memory store
//! with a manual clock, so no test ever sleeps on real timers. Wall-clock
//! waiting is exercised separately through the run-loop shutdown test.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use freshsync_core::config::SchedulerConfig;
use freshsync_core::domain::{
    job::JobState,
    newtypes::UserId,
    Endpoint, Rule, RuleChangeKind, ScheduleReason, SchedulerEvent, Storage, SyncOperation,
};
use freshsync_core::ports::{
    IClock, ISchedulerSink, IStateRepository, JobFilter, ManualClock, NullJobNotifier,
};
use freshsync_scheduler::{RuleScheduler, SchedulerHandle};
use freshsync_store::{DatabasePool, SqliteStateRepository};

// ============================================================================
// Test helpers
// ============================================================================

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap()
}

struct Fixture {
    repo: Arc<SqliteStateRepository>,
    clock: Arc<ManualClock>,
    scheduler: RuleScheduler,
    handle: SchedulerHandle,
    user: UserId,
    source: Endpoint,
    destination: Endpoint,
}

async fn setup() -> Fixture {
    setup_with_config(SchedulerConfig::default()).await
}

async fn setup_with_config(config: SchedulerConfig) -> Fixture {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let repo = Arc::new(SqliteStateRepository::new(pool.pool().clone()));
    let clock = Arc::new(ManualClock::new(start_time()));

    let user = UserId::new();
    let storage = Storage::new(user, "Backup NAS", "smb", "").unwrap();
    repo.save_storage(&storage).await.unwrap();
    let source = Endpoint::new(*storage.id(), "/data").unwrap();
    let destination = Endpoint::new(*storage.id(), "/backup").unwrap();
    repo.save_endpoint(&source).await.unwrap();
    repo.save_endpoint(&destination).await.unwrap();

    let (scheduler, handle) = RuleScheduler::new(
        repo.clone(),
        Arc::new(NullJobNotifier),
        clock.clone(),
        config,
    );

    Fixture {
        repo,
        clock,
        scheduler,
        handle,
        user,
        source,
        destination,
    }
}

impl Fixture {
    async fn create_rule(&self) -> Rule {
        let rule = Rule::new(
            self.user,
            "nightly backup",
            *self.source.id(),
            *self.destination.id(),
            SyncOperation::Copy,
        )
        .unwrap();
        self.repo.save_rule(&rule).await.unwrap();
        rule
    }

    async fn ready_jobs(&self) -> Vec<freshsync_core::domain::Job> {
        self.repo
            .list_jobs(&JobFilter::new().with_state(JobState::Ready).unclaimed())
            .await
            .unwrap()
    }
}

// ============================================================================
// Bootstrap and job creation
// ============================================================================

#[tokio::test]
async fn test_bootstrap_schedules_every_rule() {
    let mut f = setup().await;
    f.create_rule().await;
    f.create_rule().await;

    let count = f.scheduler.bootstrap().await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(f.scheduler.scheduled_count(), 2);
}

#[tokio::test]
async fn test_new_rule_produces_job_immediately() {
    let mut f = setup().await;
    let rule = f.create_rule().await;

    f.scheduler.bootstrap().await.unwrap();
    let scheduled = f.scheduler.scheduled(rule.id()).unwrap();
    assert_eq!(scheduled.reason, ScheduleReason::InitialSchedule);
    assert_eq!(scheduled.next_at, start_time());

    f.scheduler.run_pass().await.unwrap();

    // Exactly one Ready, unclaimed job exists
    let jobs = f.ready_jobs().await;
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.state(), JobState::Ready);
    assert!(job.is_unclaimed());
    assert_eq!(job.start_from(), start_time());
    assert_eq!(job.end_by(), start_time() + Duration::hours(24));

    // The rule state points at the job and the rule is parked behind it
    let state = f.repo.get_rule_state(rule.id()).await.unwrap().unwrap();
    assert_eq!(state.recent_job, Some(*job.id()));

    let scheduled = f.scheduler.scheduled(rule.id()).unwrap();
    assert_eq!(scheduled.reason, ScheduleReason::JobInProgress);
}

#[tokio::test]
async fn test_parked_rule_creates_no_second_job() {
    let mut f = setup().await;
    f.create_rule().await;
    f.scheduler.bootstrap().await.unwrap();
    f.scheduler.run_pass().await.unwrap();
    assert_eq!(f.ready_jobs().await.len(), 1);

    // Hours later the rule is still parked behind its live job
    f.clock.advance(Duration::hours(6));
    f.scheduler.run_pass().await.unwrap();
    assert_eq!(f.ready_jobs().await.len(), 1);
}

#[tokio::test]
async fn test_dry_run_creates_nothing() {
    let config = SchedulerConfig {
        job_creation_enabled: false,
        ..SchedulerConfig::default()
    };
    let mut f = setup_with_config(config).await;
    let rule = f.create_rule().await;

    f.scheduler.bootstrap().await.unwrap();
    f.scheduler.run_pass().await.unwrap();

    assert!(f.ready_jobs().await.is_empty());
    assert!(f.repo.get_rule_state(rule.id()).await.unwrap().is_none());

    // Still scheduled for a later check, not dropped
    let scheduled = f.scheduler.scheduled(rule.id()).unwrap();
    assert!(scheduled.next_at > start_time());
}

#[tokio::test]
async fn test_disabled_rule_is_parked() {
    let mut f = setup().await;
    let mut rule = f.create_rule().await;
    rule.set_enabled(false);
    f.repo.save_rule(&rule).await.unwrap();

    f.scheduler.bootstrap().await.unwrap();
    f.scheduler.run_pass().await.unwrap();

    assert!(f.ready_jobs().await.is_empty());
    let scheduled = f.scheduler.scheduled(rule.id()).unwrap();
    assert_eq!(scheduled.reason, ScheduleReason::Disabled);
}

// ============================================================================
// Event dispatch
// ============================================================================

#[tokio::test]
async fn test_rule_created_event_schedules_rule() {
    let mut f = setup().await;
    f.scheduler.bootstrap().await.unwrap();
    assert_eq!(f.scheduler.scheduled_count(), 0);

    let rule = f.create_rule().await;
    f.handle.publish(SchedulerEvent::RuleChanged {
        rule_id: *rule.id(),
        change: RuleChangeKind::Created,
    });

    // First pass ingests the event, second evaluates the now-due rule
    f.scheduler.run_pass().await.unwrap();
    assert_eq!(f.scheduler.scheduled_count(), 1);
    f.scheduler.run_pass().await.unwrap();

    assert_eq!(f.ready_jobs().await.len(), 1);
}

#[tokio::test]
async fn test_rule_deleted_event_drops_schedule() {
    let mut f = setup().await;
    let rule = f.create_rule().await;
    f.scheduler.bootstrap().await.unwrap();

    f.repo.delete_rule(rule.id()).await.unwrap();
    f.handle.publish(SchedulerEvent::RuleChanged {
        rule_id: *rule.id(),
        change: RuleChangeKind::Deleted,
    });
    f.scheduler.run_pass().await.unwrap();

    assert_eq!(f.scheduler.scheduled_count(), 0);
    assert!(f.ready_jobs().await.is_empty());
}

#[tokio::test]
async fn test_stale_queue_entry_for_deleted_rule_is_discarded() {
    let mut f = setup().await;
    let rule = f.create_rule().await;
    f.scheduler.bootstrap().await.unwrap();

    // Delete behind the scheduler's back: the queue entry goes stale only
    // after the event removes the map entry
    f.repo.delete_rule(rule.id()).await.unwrap();
    f.handle.publish(SchedulerEvent::RuleChanged {
        rule_id: *rule.id(),
        change: RuleChangeKind::Deleted,
    });

    // The pass pops the due entry first and must drop it quietly
    f.scheduler.run_pass().await.unwrap();
    assert!(f.ready_jobs().await.is_empty());
}

#[tokio::test]
async fn test_manual_trigger_forces_job_for_fresh_rule() {
    let mut f = setup().await;
    let mut rule = f.create_rule().await;
    rule.set_max_destination_age(Duration::hours(24)).unwrap();
    f.repo.save_rule(&rule).await.unwrap();

    f.scheduler.bootstrap().await.unwrap();
    f.scheduler.run_pass().await.unwrap();
    let job = f.ready_jobs().await.remove(0);

    // Complete the job successfully; the rule is fresh for 24 h
    let mut done = job.clone();
    done.claim("worker-1", f.clock.now()).unwrap();
    done.finish_success(f.clock.now()).unwrap();
    f.repo.save_job(&done).await.unwrap();
    f.handle.publish(SchedulerEvent::JobCompleted {
        job_id: *job.id(),
        rule_id: *rule.id(),
        final_state: JobState::DoneSuccess,
    });
    f.scheduler.run_pass().await.unwrap();
    assert!(f.ready_jobs().await.is_empty());

    // A manual trigger bypasses the freshness window
    f.handle.publish(SchedulerEvent::ManualTrigger {
        rule_id: *rule.id(),
    });
    f.scheduler.run_pass().await.unwrap();
    f.scheduler.run_pass().await.unwrap();

    assert_eq!(f.ready_jobs().await.len(), 1);
}

#[tokio::test]
async fn test_manual_trigger_refuses_second_live_job() {
    let mut f = setup().await;
    let rule = f.create_rule().await;
    f.scheduler.bootstrap().await.unwrap();
    f.scheduler.run_pass().await.unwrap();
    assert_eq!(f.ready_jobs().await.len(), 1);

    f.handle.publish(SchedulerEvent::ManualTrigger {
        rule_id: *rule.id(),
    });
    f.scheduler.run_pass().await.unwrap();
    f.scheduler.run_pass().await.unwrap();

    // Still only the original job
    assert_eq!(f.ready_jobs().await.len(), 1);
}

// ============================================================================
// Completion, retry, and the failure scenario
// ============================================================================

#[tokio::test]
async fn test_success_reschedules_at_max_age() {
    let mut f = setup().await;
    let mut rule = f.create_rule().await;
    rule.set_max_destination_age(Duration::hours(2)).unwrap();
    f.repo.save_rule(&rule).await.unwrap();

    f.scheduler.bootstrap().await.unwrap();
    f.scheduler.run_pass().await.unwrap();
    let job = f.ready_jobs().await.remove(0);

    f.clock.advance(Duration::minutes(10));
    let done_at = f.clock.now();
    let mut done = job.clone();
    done.claim("worker-1", done_at).unwrap();
    done.finish_success(done_at).unwrap();
    f.repo.save_job(&done).await.unwrap();

    f.handle.publish(SchedulerEvent::JobCompleted {
        job_id: *job.id(),
        rule_id: *rule.id(),
        final_state: JobState::DoneSuccess,
    });
    f.scheduler.run_pass().await.unwrap();

    let scheduled = f.scheduler.scheduled(rule.id()).unwrap();
    assert_eq!(scheduled.reason, ScheduleReason::MaxAgeExpired);
    assert_eq!(scheduled.next_at, done_at + Duration::hours(2));
}

#[tokio::test]
async fn test_failure_retries_after_default_wait() {
    // Rule with default (unset) retry time; the failed job must produce a
    // fresh Ready job only after the 15 minute default has elapsed
    let mut f = setup().await;
    let rule = f.create_rule().await;

    f.scheduler.bootstrap().await.unwrap();
    f.scheduler.run_pass().await.unwrap();
    let job = f.ready_jobs().await.remove(0);

    // Worker claims and fails the job at T0
    let t0 = f.clock.now();
    let mut failed = job.clone();
    failed.claim("worker-1", t0).unwrap();
    failed.finish_failure(t0, "transfer tool exited 1").unwrap();
    f.repo.save_job(&failed).await.unwrap();

    f.handle.publish(SchedulerEvent::JobCompleted {
        job_id: *job.id(),
        rule_id: *rule.id(),
        final_state: JobState::DoneFailure,
    });
    f.scheduler.run_pass().await.unwrap();

    let scheduled = f.scheduler.scheduled(rule.id()).unwrap();
    assert_eq!(scheduled.reason, ScheduleReason::RetryAfterFailure);
    assert_eq!(scheduled.next_at, t0 + Duration::minutes(15));

    // T0 + 10 min: nothing new
    f.clock.advance(Duration::minutes(10));
    f.scheduler.run_pass().await.unwrap();
    assert!(f.ready_jobs().await.is_empty());

    // T0 + 16 min: a fresh Ready job exists
    f.clock.advance(Duration::minutes(6));
    f.scheduler.run_pass().await.unwrap();
    let retried = f.ready_jobs().await;
    assert_eq!(retried.len(), 1);
    assert_ne!(retried[0].id(), job.id());
}

#[tokio::test]
async fn test_jobs_deleted_event_reschedules_immediately() {
    let mut f = setup().await;
    let rule = f.create_rule().await;
    f.scheduler.bootstrap().await.unwrap();
    f.scheduler.run_pass().await.unwrap();
    assert_eq!(f.ready_jobs().await.len(), 1);

    // Bulk clear wipes history and detaches the rule state
    f.repo.delete_jobs_for_user(&f.user).await.unwrap();
    f.handle.publish(SchedulerEvent::JobsDeleted {
        rule_ids: vec![*rule.id()],
    });
    f.scheduler.run_pass().await.unwrap();

    // With no recent job the rule is due again right away
    let scheduled = f.scheduler.scheduled(rule.id()).unwrap();
    assert_eq!(scheduled.reason, ScheduleReason::InitialSchedule);

    f.scheduler.run_pass().await.unwrap();
    assert_eq!(f.ready_jobs().await.len(), 1);
}

// ============================================================================
// Run loop
// ============================================================================

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let f = setup().await;
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(f.scheduler.run(shutdown.clone()));

    // Give the loop a moment to bootstrap, then cancel
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    shutdown.cancel();

    tokio::time::timeout(std::time::Duration::from_secs(2), task)
        .await
        .expect("Scheduler should stop on shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_run_processes_published_events() {
    let f = setup().await;
    let shutdown = CancellationToken::new();
    let handle = f.handle.clone();
    let repo = f.repo.clone();
    let task = tokio::spawn(f.scheduler.run(shutdown.clone()));

    // Create a rule while the loop sleeps and wake it through the handle
    let rule = Rule::new(
        f.user,
        "ad hoc",
        *f.source.id(),
        *f.destination.id(),
        SyncOperation::Sync,
    )
    .unwrap();
    repo.save_rule(&rule).await.unwrap();
    handle.publish(SchedulerEvent::RuleChanged {
        rule_id: *rule.id(),
        change: RuleChangeKind::Created,
    });

    // The loop should wake, ingest the event, and create the job
    let mut created = false;
    for _ in 0..40 {
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        let jobs = repo
            .list_jobs(&JobFilter::new().with_state(JobState::Ready))
            .await
            .unwrap();
        if !jobs.is_empty() {
            created = true;
            break;
        }
    }
    shutdown.cancel();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), task).await;

    assert!(created, "published event should produce a job");
}

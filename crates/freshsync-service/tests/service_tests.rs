//! End-to-end scenario tests across the service facade, scheduler, and
//! dispatcher
//!
//! These tests wire the whole core together over an in-memory store and a
//! manual clock: rule mutations flow through the facade, events reach the
//! scheduler, scheduler passes create jobs, and workers acquire and report
//! them through the dispatcher.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use freshsync_core::config::{DispatchConfig, SchedulerConfig};
use freshsync_core::domain::{
    job::JobState,
    newtypes::UserId,
    Endpoint, Rule, SyncOperation,
};
use freshsync_core::ports::{IStateRepository, JobFilter, ManualClock, NullJobNotifier};
use freshsync_dispatch::{JobDispatcher, ReportStatus};
use freshsync_scheduler::{RuleScheduler, SchedulerHandle};
use freshsync_service::{CatalogService, RuleService};
use freshsync_store::{DatabasePool, SqliteStateRepository};

// ============================================================================
// Test fixture
// ============================================================================

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).unwrap()
}

fn caps(schemes: &[&str]) -> HashSet<String> {
    schemes.iter().map(|s| s.to_string()).collect()
}

struct Stack {
    repo: Arc<SqliteStateRepository>,
    clock: Arc<ManualClock>,
    scheduler: RuleScheduler,
    handle: SchedulerHandle,
    rules: RuleService,
    catalog: CatalogService,
    dispatcher: JobDispatcher,
    user: UserId,
}

async fn setup() -> Stack {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let repo = Arc::new(SqliteStateRepository::new(pool.pool().clone()));
    let clock = Arc::new(ManualClock::new(start_time()));
    let notifier = Arc::new(NullJobNotifier);

    let (scheduler, handle) = RuleScheduler::new(
        repo.clone(),
        notifier.clone(),
        clock.clone(),
        SchedulerConfig::default(),
    );

    let sink = Arc::new(handle.clone());
    let rules = RuleService::new(repo.clone(), sink.clone());
    let catalog = CatalogService::new(repo.clone(), sink.clone());
    let dispatcher = JobDispatcher::new(
        repo.clone(),
        notifier,
        sink,
        clock.clone(),
        &DispatchConfig::default(),
    );

    Stack {
        repo,
        clock,
        scheduler,
        handle,
        rules,
        catalog,
        dispatcher,
        user: UserId::new(),
    }
}

impl Stack {
    /// Registers a storage with two endpoints through the catalog facade
    async fn endpoints(&self) -> (Endpoint, Endpoint) {
        let storage = self
            .catalog
            .create_storage(self.user, "Backup NAS", "smb", "")
            .await
            .unwrap();
        let source = self
            .catalog
            .create_endpoint(*storage.id(), "/data")
            .await
            .unwrap();
        let destination = self
            .catalog
            .create_endpoint(*storage.id(), "/backup")
            .await
            .unwrap();
        (source, destination)
    }

    async fn ready_jobs(&self) -> Vec<freshsync_core::domain::Job> {
        self.repo
            .list_jobs(&JobFilter::new().with_state(JobState::Ready).unclaimed())
            .await
            .unwrap()
    }
}

// ============================================================================
// Scenario: create rule -> scheduler creates job -> worker acquires
// ============================================================================

#[tokio::test]
async fn test_fresh_rule_job_is_acquirable_end_to_end() {
    let mut s = setup().await;
    let (source, destination) = s.endpoints().await;

    let mut rule = Rule::new(
        s.user,
        "nightly backup",
        *source.id(),
        *destination.id(),
        SyncOperation::Copy,
    )
    .unwrap();
    rule.set_max_destination_age(Duration::hours(24)).unwrap();
    let rule_id = s.rules.create_rule(rule).await.unwrap();

    // The creation event schedules the rule; the next pass evaluates it
    s.scheduler.run_pass().await.unwrap();
    s.scheduler.run_pass().await.unwrap();
    assert_eq!(s.ready_jobs().await.len(), 1);

    // A capable worker acquires the job as Executing with itself as owner
    let job = s
        .dispatcher
        .acquire_next_job("worker-1", &caps(&["smb"]), "")
        .await
        .unwrap()
        .expect("job should be acquirable");
    assert_eq!(job.state(), JobState::Executing);
    assert_eq!(job.owner(), "worker-1");
    assert_eq!(job.user_id(), &s.user);

    // And the rule is parked behind its live job
    let state = s.repo.get_rule_state(&rule_id).await.unwrap().unwrap();
    assert_eq!(state.recent_job, Some(*job.id()));
}

// ============================================================================
// Scenario: failure -> retry window -> fresh job
// ============================================================================

#[tokio::test]
async fn test_failure_retry_window_end_to_end() {
    let mut s = setup().await;
    let (source, destination) = s.endpoints().await;

    let mut rule = Rule::new(
        s.user,
        "retry rule",
        *source.id(),
        *destination.id(),
        SyncOperation::Sync,
    )
    .unwrap();
    rule.set_min_retry_time(Duration::minutes(15)).unwrap();
    s.rules.create_rule(rule).await.unwrap();

    s.scheduler.run_pass().await.unwrap();
    s.scheduler.run_pass().await.unwrap();

    let job = s
        .dispatcher
        .acquire_next_job("worker-1", &caps(&["smb"]), "")
        .await
        .unwrap()
        .unwrap();

    // T0: the worker reports failure; the dispatcher routes the completion
    // event back into the scheduler
    let status = s
        .dispatcher
        .report_job(job.id(), "worker-1", JobState::DoneFailure)
        .await
        .unwrap();
    assert_eq!(status, ReportStatus::Accepted);
    s.scheduler.run_pass().await.unwrap();

    // T0 + 10 min: no job for this rule
    s.clock.advance(Duration::minutes(10));
    s.scheduler.run_pass().await.unwrap();
    assert!(s
        .dispatcher
        .acquire_next_job("worker-1", &caps(&["smb"]), "")
        .await
        .unwrap()
        .is_none());

    // T0 + 16 min: a fresh Ready job exists and is acquirable
    s.clock.advance(Duration::minutes(6));
    s.scheduler.run_pass().await.unwrap();

    let retried = s
        .dispatcher
        .acquire_next_job("worker-2", &caps(&["smb"]), "")
        .await
        .unwrap()
        .expect("fresh retry job should be acquirable");
    assert_ne!(retried.id(), job.id());
    assert_eq!(retried.owner(), "worker-2");
}

// ============================================================================
// Facade behavior
// ============================================================================

#[tokio::test]
async fn test_create_rule_rejects_unknown_endpoints() {
    let s = setup().await;
    let (source, _) = s.endpoints().await;

    let rule = Rule::new(
        s.user,
        "broken",
        *source.id(),
        freshsync_core::domain::newtypes::EndpointId::new(),
        SyncOperation::Copy,
    )
    .unwrap();

    assert!(s.rules.create_rule(rule).await.is_err());
}

#[tokio::test]
async fn test_update_missing_rule_fails() {
    let s = setup().await;
    let (source, destination) = s.endpoints().await;
    let rule = Rule::new(
        s.user,
        "never saved",
        *source.id(),
        *destination.id(),
        SyncOperation::Copy,
    )
    .unwrap();

    assert!(s.rules.update_rule(&rule).await.is_err());
}

#[tokio::test]
async fn test_delete_rule_stops_future_scheduling() {
    let mut s = setup().await;
    let (source, destination) = s.endpoints().await;
    let rule = Rule::new(
        s.user,
        "short lived",
        *source.id(),
        *destination.id(),
        SyncOperation::Copy,
    )
    .unwrap();
    let rule_id = s.rules.create_rule(rule).await.unwrap();

    // Ingest creation, then delete before the evaluation pass
    s.scheduler.run_pass().await.unwrap();
    assert!(s.rules.delete_rule(&rule_id).await.unwrap());
    s.scheduler.run_pass().await.unwrap();

    assert!(s.ready_jobs().await.is_empty());
    assert_eq!(s.scheduler.scheduled_count(), 0);

    // Deleting again reports nothing to delete
    assert!(!s.rules.delete_rule(&rule_id).await.unwrap());
}

#[tokio::test]
async fn test_disable_then_enable_rule() {
    let mut s = setup().await;
    let (source, destination) = s.endpoints().await;
    let rule = Rule::new(
        s.user,
        "toggled",
        *source.id(),
        *destination.id(),
        SyncOperation::Copy,
    )
    .unwrap();
    let rule_id = s.rules.create_rule(rule).await.unwrap();

    // Disable before anything runs
    assert!(s.rules.set_rule_enabled(&rule_id, false).await.unwrap());
    s.scheduler.run_pass().await.unwrap();
    s.scheduler.run_pass().await.unwrap();
    assert!(s.ready_jobs().await.is_empty());

    // Enabling makes it due immediately (no prior job)
    assert!(s.rules.set_rule_enabled(&rule_id, true).await.unwrap());
    s.scheduler.run_pass().await.unwrap();
    s.scheduler.run_pass().await.unwrap();
    assert_eq!(s.ready_jobs().await.len(), 1);
}

#[tokio::test]
async fn test_manual_trigger_via_facade() {
    let mut s = setup().await;
    let (source, destination) = s.endpoints().await;
    let mut rule = Rule::new(
        s.user,
        "triggered",
        *source.id(),
        *destination.id(),
        SyncOperation::Copy,
    )
    .unwrap();
    rule.set_max_destination_age(Duration::hours(24)).unwrap();
    let rule_id = s.rules.create_rule(rule).await.unwrap();

    // Produce and finish the first job so the rule is fresh
    s.scheduler.run_pass().await.unwrap();
    s.scheduler.run_pass().await.unwrap();
    let job = s
        .dispatcher
        .acquire_next_job("worker-1", &caps(&["smb"]), "")
        .await
        .unwrap()
        .unwrap();
    s.dispatcher
        .report_job(job.id(), "worker-1", JobState::DoneSuccess)
        .await
        .unwrap();
    s.scheduler.run_pass().await.unwrap();
    assert!(s.ready_jobs().await.is_empty());

    // Freshness notwithstanding, a manual trigger forces a new job
    assert!(s.rules.trigger_rule(&rule_id).await.unwrap());
    s.scheduler.run_pass().await.unwrap();
    s.scheduler.run_pass().await.unwrap();
    assert_eq!(s.ready_jobs().await.len(), 1);
}

#[tokio::test]
async fn test_delete_jobs_restarts_affected_rules() {
    let mut s = setup().await;
    let (source, destination) = s.endpoints().await;
    let rule = Rule::new(
        s.user,
        "cleared",
        *source.id(),
        *destination.id(),
        SyncOperation::Copy,
    )
    .unwrap();
    s.rules.create_rule(rule).await.unwrap();

    s.scheduler.run_pass().await.unwrap();
    s.scheduler.run_pass().await.unwrap();
    assert_eq!(s.ready_jobs().await.len(), 1);

    let deleted = s.rules.delete_jobs(&s.user).await.unwrap();
    assert_eq!(deleted, 1);

    // The JobsDeleted event makes the rule due again, producing a new job
    s.scheduler.run_pass().await.unwrap();
    s.scheduler.run_pass().await.unwrap();
    assert_eq!(s.ready_jobs().await.len(), 1);
}

#[tokio::test]
async fn test_endpoint_comment_update_is_harmless() {
    let mut s = setup().await;
    let (source, destination) = s.endpoints().await;
    let rule = Rule::new(
        s.user,
        "steady",
        *source.id(),
        *destination.id(),
        SyncOperation::Copy,
    )
    .unwrap();
    s.rules.create_rule(rule).await.unwrap();
    s.scheduler.run_pass().await.unwrap();
    s.scheduler.run_pass().await.unwrap();
    let before = s.ready_jobs().await.len();

    assert!(s
        .catalog
        .update_endpoint_comment(source.id(), "annotated")
        .await
        .unwrap());
    s.scheduler.run_pass().await.unwrap();

    // No schedule change, no extra jobs
    assert_eq!(s.ready_jobs().await.len(), before);
    let stored = s.repo.get_endpoint(source.id()).await.unwrap().unwrap();
    assert_eq!(stored.comment(), "annotated");
}

#[tokio::test]
async fn test_handle_publish_is_nonblocking_without_consumer() {
    use freshsync_core::domain::newtypes::RuleId;
    use freshsync_core::domain::SchedulerEvent;
    use freshsync_core::ports::ISchedulerSink;

    let s = setup().await;
    // Publishing while the consumer never runs must not block or fail; the
    // channel is unbounded and the wake signal coalesces
    let handle = s.handle.clone();
    let start = std::time::Instant::now();
    for _ in 0..1000 {
        handle.publish(SchedulerEvent::ManualTrigger {
            rule_id: RuleId::new(),
        });
    }
    assert!(start.elapsed() < std::time::Duration::from_secs(1));
}

//! Rule management operations
//!
//! The facade the transport layer calls for rule CRUD, manual triggers, and
//! bulk job deletion. Every mutation persists first, then feeds the
//! matching event into the scheduler through the non-blocking sink; the
//! scheduler wakes, recomputes the rule's schedule, and takes it from
//! there.
//!
//! Lookup misses return `Ok(false)` (nothing to do) rather than errors;
//! errors mean the store itself failed.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use freshsync_core::domain::{
    newtypes::{RuleId, UserId},
    Rule, RuleChangeKind, SchedulerEvent,
};
use freshsync_core::ports::{ISchedulerSink, IStateRepository};

/// Rule CRUD, manual triggering, and job history clearing
pub struct RuleService {
    repo: Arc<dyn IStateRepository>,
    scheduler: Arc<dyn ISchedulerSink>,
}

impl RuleService {
    /// Creates the service over a repository and a scheduler sink
    pub fn new(repo: Arc<dyn IStateRepository>, scheduler: Arc<dyn ISchedulerSink>) -> Self {
        Self { repo, scheduler }
    }

    /// Persists a new rule and announces it to the scheduler
    ///
    /// Both endpoints must already exist; a rule referencing unknown
    /// endpoints would produce jobs nobody can execute.
    pub async fn create_rule(&self, rule: Rule) -> Result<RuleId> {
        self.require_endpoint(&rule, rule.source_endpoint()).await?;
        self.require_endpoint(&rule, rule.destination_endpoint())
            .await?;

        self.repo
            .save_rule(&rule)
            .await
            .context("Failed to persist new rule")?;

        info!(rule_id = %rule.id(), rule = rule.name(), "Rule created");
        self.scheduler.publish(SchedulerEvent::RuleChanged {
            rule_id: *rule.id(),
            change: RuleChangeKind::Created,
        });

        Ok(*rule.id())
    }

    /// Persists changes to an existing rule
    pub async fn update_rule(&self, rule: &Rule) -> Result<()> {
        if self.repo.get_rule(rule.id()).await?.is_none() {
            bail!("Rule {} does not exist", rule.id());
        }

        self.repo
            .save_rule(rule)
            .await
            .context("Failed to persist rule update")?;

        info!(rule_id = %rule.id(), "Rule updated");
        self.scheduler.publish(SchedulerEvent::RuleChanged {
            rule_id: *rule.id(),
            change: RuleChangeKind::Updated,
        });

        Ok(())
    }

    /// Deletes a rule; returns false when it did not exist
    pub async fn delete_rule(&self, rule_id: &RuleId) -> Result<bool> {
        if self.repo.get_rule(rule_id).await?.is_none() {
            return Ok(false);
        }

        self.repo
            .delete_rule(rule_id)
            .await
            .context("Failed to delete rule")?;

        info!(rule_id = %rule_id, "Rule deleted");
        self.scheduler.publish(SchedulerEvent::RuleChanged {
            rule_id: *rule_id,
            change: RuleChangeKind::Deleted,
        });

        Ok(true)
    }

    /// Switches a rule on or off; returns false when it did not exist
    pub async fn set_rule_enabled(&self, rule_id: &RuleId, enabled: bool) -> Result<bool> {
        let Some(mut rule) = self.repo.get_rule(rule_id).await? else {
            return Ok(false);
        };
        if rule.is_enabled() == enabled {
            return Ok(true);
        }

        rule.set_enabled(enabled);
        self.repo
            .save_rule(&rule)
            .await
            .context("Failed to persist rule enablement")?;

        let change = if enabled {
            RuleChangeKind::Enabled
        } else {
            RuleChangeKind::Disabled
        };
        info!(rule_id = %rule_id, change = %change, "Rule enablement changed");
        self.scheduler.publish(SchedulerEvent::RuleChanged {
            rule_id: *rule_id,
            change,
        });

        Ok(true)
    }

    /// Asks the scheduler to run a rule now, bypassing its schedule
    ///
    /// Returns false when the rule does not exist.
    pub async fn trigger_rule(&self, rule_id: &RuleId) -> Result<bool> {
        if self.repo.get_rule(rule_id).await?.is_none() {
            return Ok(false);
        }

        info!(rule_id = %rule_id, "Manual trigger requested");
        self.scheduler
            .publish(SchedulerEvent::ManualTrigger { rule_id: *rule_id });
        Ok(true)
    }

    /// Bulk-clears a user's job history; returns the number of deleted jobs
    ///
    /// Rules whose recent job vanished are announced so the scheduler
    /// reschedules them from scratch.
    pub async fn delete_jobs(&self, user_id: &UserId) -> Result<u64> {
        let deleted = self
            .repo
            .delete_jobs_for_user(user_id)
            .await
            .context("Failed to clear job history")?;

        let rule_ids: Vec<RuleId> = self
            .repo
            .list_rules_for_user(user_id)
            .await?
            .iter()
            .map(|r| *r.id())
            .collect();

        info!(user_id = %user_id, deleted, rules = rule_ids.len(), "Job history cleared");
        if !rule_ids.is_empty() {
            self.scheduler
                .publish(SchedulerEvent::JobsDeleted { rule_ids });
        }

        Ok(deleted)
    }

    async fn require_endpoint(
        &self,
        rule: &Rule,
        endpoint_id: &freshsync_core::domain::newtypes::EndpointId,
    ) -> Result<()> {
        if self.repo.get_endpoint(endpoint_id).await?.is_none() {
            bail!(
                "Rule '{}' references unknown endpoint {}",
                rule.name(),
                endpoint_id
            );
        }
        Ok(())
    }
}

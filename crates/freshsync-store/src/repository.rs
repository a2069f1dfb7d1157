//! SQLite implementation of IStateRepository
//!
//! This module provides the concrete SQLite-based implementation of the
//! state repository port defined in freshsync-core. It handles all domain
//! type serialization/deserialization and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type            | SQL Type | Strategy                                   |
//! |------------------------|----------|--------------------------------------------|
//! | UserId, RuleId, JobId  | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | StorageId, EndpointId  | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | EndpointKey            | TEXT     | String via `.as_str()` / `EndpointKey::new()` |
//! | SyncOperation          | TEXT     | lower snake string (serde representation)  |
//! | JobState               | TEXT     | lower snake string (serde representation)  |
//! | DateTime<Utc>          | TEXT     | ISO 8601 via `to_rfc3339()` / `parse_from_rfc3339()` |
//! | NaiveTime              | TEXT     | `%H:%M:%S`                                 |
//!
//! Entities have private fields; rows are reconstructed through serde so
//! that construction-time validation stays in one place.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use freshsync_core::domain::{
    newtypes::{EndpointId, JobId, RuleId, StorageId, UserId},
    Endpoint, Job, Rule, RuleState, Storage,
};
use freshsync_core::ports::{IStateRepository, JobFilter};

use crate::StoreError;

/// SQLite-based implementation of the state repository port
///
/// Provides persistent storage for all domain entities using SQLite.
/// All operations are performed through a connection pool for concurrency.
pub struct SqliteStateRepository {
    pool: SqlitePool,
}

impl SqliteStateRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Try parsing without timezone (SQLite default format)
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
                .map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            StoreError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Deserialize an entity from a serde_json value assembled out of row columns
fn from_json<T: serde::de::DeserializeOwned>(
    entity: &str,
    value: serde_json::Value,
) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| {
        StoreError::SerializationError(format!("Failed to reconstruct {}: {}", entity, e))
    })
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn storage_from_row(row: &SqliteRow) -> Result<Storage, StoreError> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    let name: String = row.get("name");
    let scheme: String = row.get("scheme");
    let network: String = row.get("network");
    let comment: String = row.get("comment");

    from_json(
        "Storage",
        serde_json::json!({
            "id": id,
            "user_id": user_id,
            "name": name,
            "scheme": scheme,
            "network": network,
            "comment": comment,
        }),
    )
}

fn endpoint_from_row(row: &SqliteRow) -> Result<Endpoint, StoreError> {
    let id: String = row.get("id");
    let storage_id: String = row.get("storage_id");
    let path: String = row.get("path");
    let comment: String = row.get("comment");

    from_json(
        "Endpoint",
        serde_json::json!({
            "id": id,
            "storage_id": storage_id,
            "path": path,
            "comment": comment,
        }),
    )
}

fn rule_from_row(row: &SqliteRow) -> Result<Rule, StoreError> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    let name: String = row.get("name");
    let source_endpoint: String = row.get("source_endpoint");
    let destination_endpoint: String = row.get("destination_endpoint");
    let operation: String = row.get("operation");
    let max_destination_age_secs: i64 = row.get("max_destination_age_secs");
    let min_retry_time_secs: i64 = row.get("min_retry_time_secs");
    let max_time_after_source_modification_secs: i64 =
        row.get("max_time_after_source_modification_secs");
    let daily_trigger_time: Option<String> = row.get("daily_trigger_time");
    let enabled: i64 = row.get("enabled");

    from_json(
        "Rule",
        serde_json::json!({
            "id": id,
            "user_id": user_id,
            "name": name,
            "source_endpoint": source_endpoint,
            "destination_endpoint": destination_endpoint,
            "operation": operation,
            "max_destination_age_secs": max_destination_age_secs,
            "min_retry_time_secs": min_retry_time_secs,
            "max_time_after_source_modification_secs": max_time_after_source_modification_secs,
            "daily_trigger_time": daily_trigger_time,
            "enabled": enabled != 0,
        }),
    )
}

fn rule_state_from_row(row: &SqliteRow) -> Result<RuleState, StoreError> {
    let rule_id: String = row.get("rule_id");
    let expired_after: String = row.get("expired_after");
    let recent_job: Option<String> = row.get("recent_job");

    let rule_id: RuleId = rule_id
        .parse()
        .map_err(|e| StoreError::SerializationError(format!("{e}")))?;
    let recent_job = recent_job
        .map(|s| {
            s.parse::<JobId>()
                .map_err(|e| StoreError::SerializationError(format!("{e}")))
        })
        .transpose()?;

    Ok(RuleState {
        rule_id,
        expired_after: parse_datetime(&expired_after)?,
        recent_job,
    })
}

fn job_from_row(row: &SqliteRow) -> Result<Job, StoreError> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    let tag: String = row.get("tag");
    let source_endpoint: String = row.get("source_endpoint");
    let destination_endpoint: String = row.get("destination_endpoint");
    let source_key: String = row.get("source_key");
    let destination_key: String = row.get("destination_key");
    let operation: String = row.get("operation");
    let owner: String = row.get("owner");
    let state: String = row.get("state");
    let start_from: String = row.get("start_from");
    let end_by: String = row.get("end_by");
    let last_reported: String = row.get("last_reported");
    let status: String = row.get("status");

    from_json(
        "Job",
        serde_json::json!({
            "id": id,
            "user_id": user_id,
            "tag": tag,
            "source_endpoint": source_endpoint,
            "destination_endpoint": destination_endpoint,
            "source_key": source_key,
            "destination_key": destination_key,
            "operation": operation,
            "owner": owner,
            "state": state,
            "start_from": parse_datetime(&start_from)?.to_rfc3339(),
            "end_by": parse_datetime(&end_by)?.to_rfc3339(),
            "last_reported": parse_datetime(&last_reported)?.to_rfc3339(),
            "status": status,
        }),
    )
}

// ============================================================================
// IStateRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl IStateRepository for SqliteStateRepository {
    // --- Storage operations ---

    async fn save_storage(&self, storage: &Storage) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO storages (id, user_id, name, scheme, network, comment)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                scheme = excluded.scheme,
                network = excluded.network,
                comment = excluded.comment
            "#,
        )
        .bind(storage.id().to_string())
        .bind(storage.user_id().to_string())
        .bind(storage.name())
        .bind(storage.scheme())
        .bind(storage.network())
        .bind(storage.comment())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_storage(&self, id: &StorageId) -> anyhow::Result<Option<Storage>> {
        let row = sqlx::query("SELECT * FROM storages WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| storage_from_row(&r)).transpose().map_err(Into::into)
    }

    // --- Endpoint operations ---

    async fn save_endpoint(&self, endpoint: &Endpoint) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO endpoints (id, storage_id, path, comment)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                comment = excluded.comment
            "#,
        )
        .bind(endpoint.id().to_string())
        .bind(endpoint.storage_id().to_string())
        .bind(endpoint.path())
        .bind(endpoint.comment())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_endpoint(&self, id: &EndpointId) -> anyhow::Result<Option<Endpoint>> {
        let row = sqlx::query("SELECT * FROM endpoints WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| endpoint_from_row(&r)).transpose().map_err(Into::into)
    }

    // --- Rule operations ---

    async fn save_rule(&self, rule: &Rule) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rules (
                id, user_id, name, source_endpoint, destination_endpoint,
                operation, max_destination_age_secs, min_retry_time_secs,
                max_time_after_source_modification_secs, daily_trigger_time,
                enabled
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                source_endpoint = excluded.source_endpoint,
                destination_endpoint = excluded.destination_endpoint,
                operation = excluded.operation,
                max_destination_age_secs = excluded.max_destination_age_secs,
                min_retry_time_secs = excluded.min_retry_time_secs,
                max_time_after_source_modification_secs = excluded.max_time_after_source_modification_secs,
                daily_trigger_time = excluded.daily_trigger_time,
                enabled = excluded.enabled
            "#,
        )
        .bind(rule.id().to_string())
        .bind(rule.user_id().to_string())
        .bind(rule.name())
        .bind(rule.source_endpoint().to_string())
        .bind(rule.destination_endpoint().to_string())
        .bind(rule.operation().to_string())
        .bind(rule.max_destination_age().map_or(0, |d| d.num_seconds()))
        .bind(rule.min_retry_time().map_or(0, |d| d.num_seconds()))
        .bind(
            rule.max_time_after_source_modification()
                .map_or(0, |d| d.num_seconds()),
        )
        .bind(
            rule.daily_trigger_time()
                .map(|t| t.format("%H:%M:%S").to_string()),
        )
        .bind(i64::from(rule.is_enabled()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_rule(&self, id: &RuleId) -> anyhow::Result<Option<Rule>> {
        let row = sqlx::query("SELECT * FROM rules WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| rule_from_row(&r)).transpose().map_err(Into::into)
    }

    async fn list_rules(&self) -> anyhow::Result<Vec<Rule>> {
        let rows = sqlx::query("SELECT * FROM rules ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| rule_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn list_rules_for_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Rule>> {
        let rows = sqlx::query("SELECT * FROM rules WHERE user_id = ?1 ORDER BY id")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| rule_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn delete_rule(&self, id: &RuleId) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM rule_states WHERE rule_id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM rules WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // --- RuleState operations ---

    async fn save_rule_state(&self, state: &RuleState) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rule_states (rule_id, expired_after, recent_job)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(rule_id) DO UPDATE SET
                expired_after = excluded.expired_after,
                recent_job = excluded.recent_job
            "#,
        )
        .bind(state.rule_id.to_string())
        .bind(state.expired_after.to_rfc3339())
        .bind(state.recent_job.map(|j| j.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_rule_state(&self, rule_id: &RuleId) -> anyhow::Result<Option<RuleState>> {
        let row = sqlx::query("SELECT * FROM rule_states WHERE rule_id = ?1")
            .bind(rule_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| rule_state_from_row(&r))
            .transpose()
            .map_err(Into::into)
    }

    async fn get_rule_state_by_recent_job(
        &self,
        job_id: &JobId,
    ) -> anyhow::Result<Option<RuleState>> {
        let row = sqlx::query("SELECT * FROM rule_states WHERE recent_job = ?1")
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| rule_state_from_row(&r))
            .transpose()
            .map_err(Into::into)
    }

    // --- Job operations ---

    async fn save_job(&self, job: &Job) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, user_id, tag, source_endpoint, destination_endpoint,
                source_key, destination_key, operation, owner, state,
                start_from, end_by, last_reported, status
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                state = excluded.state,
                start_from = excluded.start_from,
                end_by = excluded.end_by,
                last_reported = excluded.last_reported,
                status = excluded.status
            "#,
        )
        .bind(job.id().to_string())
        .bind(job.user_id().to_string())
        .bind(job.tag())
        .bind(job.source_endpoint().to_string())
        .bind(job.destination_endpoint().to_string())
        .bind(job.source_key().as_str())
        .bind(job.destination_key().as_str())
        .bind(job.operation().to_string())
        .bind(job.owner())
        .bind(job.state().to_string())
        .bind(job.start_from().to_rfc3339())
        .bind(job.end_by().to_rfc3339())
        .bind(job.last_reported().to_rfc3339())
        .bind(job.status())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> anyhow::Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| job_from_row(&r)).transpose().map_err(Into::into)
    }

    async fn list_jobs(&self, filter: &JobFilter) -> anyhow::Result<Vec<Job>> {
        let mut sql = String::from("SELECT * FROM jobs");
        let mut clauses: Vec<&str> = Vec::new();

        if filter.state.is_some() {
            clauses.push("state = ?");
        }
        if filter.user_id.is_some() {
            clauses.push("user_id = ?");
        }
        if filter.unclaimed_only {
            clauses.push("owner = ''");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY start_from ASC, id ASC");

        let mut query = sqlx::query(&sql);
        if let Some(state) = filter.state {
            query = query.bind(state.to_string());
        }
        if let Some(user_id) = &filter.user_id {
            query = query.bind(user_id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|r| job_from_row(r).map_err(Into::into))
            .collect()
    }

    async fn claim_job(
        &self,
        id: &JobId,
        owner: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        // The at-most-one-claim guarantee: the guard and the write are one
        // statement, so two racing callers cannot both see Ready/unowned.
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET owner = ?1, state = 'executing', last_reported = ?2
            WHERE id = ?3 AND state = 'ready' AND owner = ''
            "#,
        )
        .bind(owner)
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_jobs_for_user(&self, user_id: &UserId) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;

        // Detach first so affected rules reschedule from scratch
        sqlx::query(
            r#"
            UPDATE rule_states SET recent_job = NULL
            WHERE rule_id IN (SELECT id FROM rules WHERE user_id = ?1)
            "#,
        )
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM jobs WHERE user_id = ?1")
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

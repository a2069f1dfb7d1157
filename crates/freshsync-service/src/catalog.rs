//! Storage and endpoint management operations
//!
//! Storages and endpoints are identity-stable: everything except the
//! free-text comment is fixed at creation. Comment edits on endpoints are
//! announced to the scheduler for the log trail, although they never change
//! a schedule.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use freshsync_core::domain::{
    newtypes::{EndpointId, StorageId, UserId},
    Endpoint, SchedulerEvent, Storage,
};
use freshsync_core::ports::{ISchedulerSink, IStateRepository};

/// Storage and endpoint registration
pub struct CatalogService {
    repo: Arc<dyn IStateRepository>,
    scheduler: Arc<dyn ISchedulerSink>,
}

impl CatalogService {
    /// Creates the service over a repository and a scheduler sink
    pub fn new(repo: Arc<dyn IStateRepository>, scheduler: Arc<dyn ISchedulerSink>) -> Self {
        Self { repo, scheduler }
    }

    /// Registers a new storage for a user
    pub async fn create_storage(
        &self,
        user_id: UserId,
        name: &str,
        scheme: &str,
        network: &str,
    ) -> Result<Storage> {
        let storage = Storage::new(user_id, name, scheme, network)?;
        self.repo
            .save_storage(&storage)
            .await
            .context("Failed to persist new storage")?;

        info!(storage_id = %storage.id(), name, scheme, "Storage created");
        Ok(storage)
    }

    /// Registers a new endpoint within an existing storage
    pub async fn create_endpoint(&self, storage_id: StorageId, path: &str) -> Result<Endpoint> {
        if self.repo.get_storage(&storage_id).await?.is_none() {
            bail!("Endpoint references unknown storage {storage_id}");
        }

        let endpoint = Endpoint::new(storage_id, path)?;
        self.repo
            .save_endpoint(&endpoint)
            .await
            .context("Failed to persist new endpoint")?;

        info!(endpoint_id = %endpoint.id(), key = %endpoint.key(), "Endpoint created");
        Ok(endpoint)
    }

    /// Updates an endpoint's comment; returns false when it did not exist
    ///
    /// The comment is the only mutable endpoint attribute.
    pub async fn update_endpoint_comment(
        &self,
        endpoint_id: &EndpointId,
        comment: &str,
    ) -> Result<bool> {
        let Some(mut endpoint) = self.repo.get_endpoint(endpoint_id).await? else {
            return Ok(false);
        };

        endpoint.set_comment(comment);
        self.repo
            .save_endpoint(&endpoint)
            .await
            .context("Failed to persist endpoint comment")?;

        self.scheduler.publish(SchedulerEvent::EndpointUpdated {
            endpoint_id: *endpoint_id,
        });
        Ok(true)
    }

    /// Updates a storage's comment; returns false when it did not exist
    pub async fn update_storage_comment(
        &self,
        storage_id: &StorageId,
        comment: &str,
    ) -> Result<bool> {
        let Some(mut storage) = self.repo.get_storage(storage_id).await? else {
            return Ok(false);
        };

        storage.set_comment(comment);
        self.repo
            .save_storage(&storage)
            .await
            .context("Failed to persist storage comment")?;
        Ok(true)
    }
}

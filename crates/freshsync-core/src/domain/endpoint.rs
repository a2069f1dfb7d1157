//! Endpoint domain entity
//!
//! An endpoint is a path within a storage: the `(storage, path)` pair is its
//! immutable identity, and only the free-text comment may change after
//! creation. Every endpoint derives a hierarchical [`EndpointKey`] used by
//! the dispatch protocol's overlap tests.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{EndpointId, EndpointKey, StorageId};

/// A path within a named storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    id: EndpointId,
    storage_id: StorageId,
    path: String,
    comment: String,
}

impl Endpoint {
    /// Creates a new endpoint
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if the path is empty, relative,
    /// or contains parent-directory traversal.
    pub fn new(storage_id: StorageId, path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into();

        if path.is_empty() {
            return Err(DomainError::InvalidPath(
                "Endpoint path cannot be empty".to_string(),
            ));
        }
        if !path.starts_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "Endpoint path must be absolute: {path}"
            )));
        }
        if path.contains("..") {
            return Err(DomainError::InvalidPath(format!(
                "Endpoint path contains invalid traversal: {path}"
            )));
        }
        if path.len() > 1 && path.contains("//") {
            return Err(DomainError::InvalidPath(format!(
                "Endpoint path contains double slashes: {path}"
            )));
        }

        Ok(Self {
            id: EndpointId::new(),
            storage_id,
            path,
            comment: String::new(),
        })
    }

    /// The endpoint's unique ID
    #[must_use]
    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    /// The storage this endpoint lives in
    #[must_use]
    pub fn storage_id(&self) -> &StorageId {
        &self.storage_id
    }

    /// The path within the storage
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Free-text comment (the only mutable attribute)
    #[must_use]
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// The hierarchical resource key used for conflict checks
    #[must_use]
    pub fn key(&self) -> EndpointKey {
        EndpointKey::derive(&self.storage_id, &self.path)
    }

    /// Updates the comment
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }
}

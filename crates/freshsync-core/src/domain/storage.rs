//! Storage domain entity
//!
//! A storage names a concrete storage technology instance a user has
//! registered: a cloud drive, a local filesystem root, a network share.
//! The technology is identified by its URI scheme, which doubles as the
//! **capability** workers declare during job acquisition: a worker that
//! cannot speak `smb` never receives a job touching an `smb` storage.
//!
//! An optional **network tag** constrains locality: when non-empty, only
//! callers reporting the same network may acquire jobs that touch this
//! storage.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{StorageId, UserId};

/// A named storage technology instance owned by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    id: StorageId,
    user_id: UserId,
    /// Human-readable display name
    name: String,
    /// URI scheme of the storage technology (e.g. `file`, `smb`, `clouddrive`)
    scheme: String,
    /// Locality constraint; empty means reachable from any network
    network: String,
    comment: String,
}

impl Storage {
    /// Creates a new storage
    ///
    /// # Errors
    /// Returns `DomainError::ValidationFailed` if the name or scheme is empty,
    /// or if the scheme contains characters outside `[a-z0-9+.-]`.
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        scheme: impl Into<String>,
        network: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        let scheme = scheme.into();

        if name.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "Storage name cannot be empty".to_string(),
            ));
        }
        if scheme.is_empty() {
            return Err(DomainError::ValidationFailed(
                "Storage scheme cannot be empty".to_string(),
            ));
        }
        // RFC 3986 scheme characters, lowercased
        if !scheme
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+.-".contains(c))
        {
            return Err(DomainError::ValidationFailed(format!(
                "Storage scheme contains invalid characters: {scheme}"
            )));
        }

        Ok(Self {
            id: StorageId::new(),
            user_id,
            name,
            scheme,
            network: network.into(),
            comment: String::new(),
        })
    }

    /// The storage's unique ID
    #[must_use]
    pub fn id(&self) -> &StorageId {
        &self.id
    }

    /// The owning user
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URI scheme, matched against worker capabilities
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Network tag; empty means no locality constraint
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Free-text comment
    #[must_use]
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Returns true when a caller on `network` may use this storage
    #[must_use]
    pub fn reachable_from(&self, network: &str) -> bool {
        self.network.is_empty() || self.network == network
    }

    /// Updates the comment
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_valid_storage() {
        let storage = Storage::new(UserId::new(), "Backup NAS", "smb", "home-lan").unwrap();
        assert_eq!(storage.name(), "Backup NAS");
        assert_eq!(storage.scheme(), "smb");
        assert_eq!(storage.network(), "home-lan");
        assert_eq!(storage.comment(), "");
    }

    #[test]
    fn test_empty_name_fails() {
        assert!(Storage::new(UserId::new(), "  ", "file", "").is_err());
    }

    #[test]
    fn test_empty_scheme_fails() {
        assert!(Storage::new(UserId::new(), "Local", "", "").is_err());
    }

    #[test]
    fn test_uppercase_scheme_fails() {
        assert!(Storage::new(UserId::new(), "Local", "SMB", "").is_err());
    }

    #[test]
    fn test_reachable_from() {
        let open = Storage::new(UserId::new(), "Cloud", "clouddrive", "").unwrap();
        assert!(open.reachable_from("anywhere"));
        assert!(open.reachable_from(""));

        let tagged = Storage::new(UserId::new(), "NAS", "smb", "home-lan").unwrap();
        assert!(tagged.reachable_from("home-lan"));
        assert!(!tagged.reachable_from("office"));
        assert!(!tagged.reachable_from(""));
    }

    #[test]
    fn test_set_comment() {
        let mut storage = Storage::new(UserId::new(), "Local", "file", "").unwrap();
        storage.set_comment("primary disk");
        assert_eq!(storage.comment(), "primary disk");
    }
}

//! Live endpoint access map
//!
//! During each acquisition call the dispatcher rebuilds, from currently
//! persisted Executing jobs, a map of which endpoint keys are being read
//! and written right now. The map has asymmetric semantics:
//!
//! - **Sources are shared**: any number of live jobs may read the same key,
//!   but a reader never displaces a writer.
//! - **Destinations are exclusive**: a written key blocks every overlapping
//!   key, read or written.
//!
//! Overlap is hierarchical prefix containment in either direction (see
//! [`EndpointKey::overlaps`]).

use std::collections::HashMap;

use tracing::warn;

use freshsync_core::domain::newtypes::EndpointKey;

/// How a live job touches an endpoint key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// The key is a source of at least one live job
    Reading,
    /// The key is the destination of a live job
    Writing,
}

/// Which endpoint keys live jobs are touching, and how
#[derive(Debug, Default)]
pub struct AccessMap {
    entries: HashMap<EndpointKey, AccessKind>,
}

impl AccessMap {
    /// Creates an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a live job reading `key`
    ///
    /// A key already marked `Writing` stays `Writing`: a destination under
    /// write is stronger than any number of readers. That combination means
    /// two live jobs disagree about the key, which the conflict scan should
    /// have prevented, so it is logged.
    pub fn record_read(&mut self, key: EndpointKey) {
        match self.entries.get(&key) {
            Some(AccessKind::Writing) => {
                warn!(
                    key = %key,
                    "Endpoint key is both read and written by live jobs, keeping write access"
                );
            }
            _ => {
                self.entries.insert(key, AccessKind::Reading);
            }
        }
    }

    /// Records a live job writing `key`
    ///
    /// Any pre-existing entry for the exact key is unexpected for the same
    /// reason as above and is logged before being overwritten.
    pub fn record_write(&mut self, key: EndpointKey) {
        if let Some(existing) = self.entries.get(&key) {
            warn!(
                key = %key,
                access = ?existing,
                "Endpoint key already accessed by another live job, overwriting with write access"
            );
        }
        self.entries.insert(key, AccessKind::Writing);
    }

    /// Would reading `key` conflict with live jobs?
    ///
    /// Reading conflicts only with overlapping writes; readers never block
    /// readers.
    #[must_use]
    pub fn blocks_read(&self, key: &EndpointKey) -> bool {
        self.entries
            .iter()
            .any(|(held, access)| *access == AccessKind::Writing && held.overlaps(key))
    }

    /// Would writing `key` conflict with live jobs?
    ///
    /// Writing conflicts with any overlapping access, read or write.
    #[must_use]
    pub fn blocks_write(&self, key: &EndpointKey) -> bool {
        self.entries.keys().any(|held| held.overlaps(key))
    }

    /// Number of distinct keys under access
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no live job touches any key
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Pixel registry
//!
//! Short-lived mapping from a generated pixel identifier to its delivery
//! mode and creation time. The table is bounded: once it reaches the
//! high-water mark, a sweep evicts records older than the retention window
//! before a new record is admitted. The sweep runs opportunistically on the
//! generate path only, never on a timer, keeping the hot path free of
//! background work.

use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use pixelping_core::{PixelId, PixelMode, PixelRecord};

/// Configuration for the pixel registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// High-water mark that triggers an eviction sweep
    pub max_entries: usize,
    /// Retention window for records
    pub retention: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            retention: Duration::from_secs(3600), // 1 hour
        }
    }
}

/// Bounded in-memory registry of generated pixels
///
/// Records are owned exclusively by the registry: created on generation,
/// read (never mutated) on fetch, evicted after the retention window.
pub struct PixelRegistry {
    records: DashMap<PixelId, PixelRecord>,
    config: RegistryConfig,
}

impl PixelRegistry {
    /// Create a new registry
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            records: DashMap::new(),
            config,
        }
    }

    /// Allocate a fresh identifier and remember its delivery mode
    ///
    /// The mode has already been validated at the parsing boundary; an
    /// invalid mode is unrepresentable here.
    pub fn generate(&self, mode: PixelMode, requester_ip: &str) -> PixelId {
        if self.records.len() >= self.config.max_entries {
            let evicted = self.evict_expired();
            debug!(evicted, remaining = self.records.len(), "Registry sweep");
        }

        let id = PixelId::new();
        self.records.insert(id, PixelRecord::new(id, mode, requester_ip));
        id
    }

    /// Look up a record without touching its retention
    pub fn lookup(&self, id: &PixelId) -> Option<PixelRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    /// Remove all records older than the retention window
    ///
    /// Returns the number of records removed.
    pub fn evict_expired(&self) -> usize {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let cutoff = Utc::now() - retention;

        let before = self.records.len();
        self.records.retain(|_, record| record.created_at > cutoff);
        before - self.records.len()
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a pre-built record directly (test hook for aged entries)
    #[cfg(test)]
    pub(crate) fn insert_record(&self, record: PixelRecord) {
        self.records.insert(record.id, record);
    }
}

//! Structured log events
//!
//! An [`EventEntry`] is the unit the event log persists: a timestamp, a
//! stable machine event name, a human description, and a flat map of
//! already-extracted fields. Entries are append-only; once written they are
//! never mutated or deleted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stream category a log entry is partitioned under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    /// Pixel lifecycle and custom events
    Pixel,
    /// Transport-level request/response events
    Api,
}

impl LogCategory {
    /// Lowercase name used in partition file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pixel => "pixel",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only structured log entry
///
/// The fields map is flattened on serialization, so the persisted shape is
/// `{ "timestamp": ..., "event": ..., "description": ..., <fields...> }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEntry {
    /// When the entry was appended
    pub timestamp: DateTime<Utc>,
    /// Stable machine event name
    pub event: String,
    /// Human-readable description
    pub description: String,
    /// Already-extracted primitive fields (camelCase keys)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EventEntry {
    /// Create an entry stamped with the current time
    pub fn new(
        event: impl Into<String>,
        description: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.into(),
            description: description.into(),
            fields,
        }
    }
}

//! Pixel identifiers and registry records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mode::PixelMode;

/// Opaque unique identifier for one generated pixel
///
/// Correlates the "request a pixel" call with the later "fetch the pixel
/// bytes" call. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PixelId(Uuid);

impl PixelId {
    /// Allocate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PixelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PixelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PixelId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Registry record for one generated pixel
///
/// Owned exclusively by the pixel registry: created on generation, read on
/// fetch, evicted after the retention window. Never mutated in between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixelRecord {
    /// Pixel identifier
    pub id: PixelId,
    /// Delivery mode requested at generation time
    pub mode: PixelMode,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// IP the generation request came from
    pub requester_ip: String,
}

impl PixelRecord {
    /// Create a new record stamped with the current time
    pub fn new(id: PixelId, mode: PixelMode, requester_ip: impl Into<String>) -> Self {
        Self {
            id,
            mode,
            created_at: Utc::now(),
            requester_ip: requester_ip.into(),
        }
    }

    /// Age of this record
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

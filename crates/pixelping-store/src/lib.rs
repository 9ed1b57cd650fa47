//! # PixelPing Store
//!
//! Append-only structured event persistence for the PixelPing service.
//!
//! Entries are partitioned by UTC calendar date and stream category, one
//! JSON-array file per partition. Appends replace the partition file
//! atomically (write-to-temp, then rename) so a reader never observes a
//! truncated or malformed partition, even across a process crash mid-write.
//!
//! Logging here is best-effort, not authoritative storage: a partition
//! whose existing content no longer parses is treated as empty and
//! self-heals on the next append.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pixelping_core::{EventEntry, LogCategory};
//! use pixelping_store::{EventLog, EventLogConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let log = EventLog::new(EventLogConfig::default()).await.unwrap();
//!     let entry = EventEntry::new("custom_event", "something happened", Default::default());
//!     log.append(LogCategory::Pixel, entry).await.unwrap();
//! }
//! ```

pub mod error;
pub mod event_log;

// Re-exports
pub use error::StoreError;
pub use event_log::{EventLog, EventLogConfig, PartitionKey};

//! Partitioned event log implementation
//!
//! Each `(date, category)` partition has two on-disk representations:
//!
//! - an **active line file** (`{date}-{category}.jsonl`), one JSON object
//!   per line, appended in O(1) per entry
//! - a **materialized array file** (`{date}-{category}.json`), the external
//!   JSON-array contract, produced when a partition is compacted
//!
//! Appends go to the line file only; the whole-array rewrite happens once
//! per partition, at rotation, instead of once per event. Compaction
//! replaces the array file atomically (write-to-temp, then rename), so a
//! reader never observes a truncated or malformed array. A torn trailing
//! line left by a crash is truncated back to the previous complete entry
//! on the next open.
//!
//! A per-partition async mutex serializes concurrent appends so no two
//! read-modify cycles can lose entries. Distinct partitions never contend.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use pixelping_core::{EventEntry, LogCategory};

use crate::error::StoreError;

/// Configuration for the event log
#[derive(Debug, Clone)]
pub struct EventLogConfig {
    /// Directory partition files are written to
    pub base_dir: PathBuf,
    /// Pretty-print materialized array files
    pub pretty: bool,
    /// Whether to sync line appends to disk immediately
    pub sync_on_write: bool,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./logs"),
            pretty: true,
            sync_on_write: true,
        }
    }
}

/// Identity of one log partition: UTC calendar date × stream category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    /// UTC calendar date
    pub date: NaiveDate,
    /// Stream category
    pub category: LogCategory,
}

impl PartitionKey {
    /// Partition for the current UTC date
    ///
    /// A new date automatically opens a new partition; there is no explicit
    /// rollover step.
    pub fn today(category: LogCategory) -> Self {
        Self {
            date: Utc::now().date_naive(),
            category,
        }
    }

    /// File stem of this partition, e.g. `2026-08-07-pixel`
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.date.format("%Y-%m-%d"), self.category)
    }

    /// Parse a partition key back out of a file stem
    fn from_file_stem(stem: &str) -> Option<Self> {
        let (date_part, category_part) = stem.split_at_checked(11)?;
        let date = NaiveDate::parse_from_str(&date_part[..10], "%Y-%m-%d").ok()?;
        let category = match category_part {
            "pixel" => LogCategory::Pixel,
            "api" => LogCategory::Api,
            _ => return None,
        };
        Some(Self { date, category })
    }
}

/// Partitioned append-only event log
pub struct EventLog {
    config: EventLogConfig,
    /// Per-partition append locks guarding append and compaction cycles
    locks: DashMap<PartitionKey, Arc<Mutex<()>>>,
    /// Date of the most recent append, for rotation detection
    active_date: Mutex<Option<NaiveDate>>,
}

impl EventLog {
    /// Open an event log, repairing and compacting leftover partitions
    ///
    /// Startup recovery truncates any torn trailing line a crash left in an
    /// active line file, then compacts every line file from a previous day
    /// into its array form.
    pub async fn new(config: EventLogConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.base_dir).await?;

        let log = Self {
            config,
            locks: DashMap::new(),
            active_date: Mutex::new(None),
        };

        let repaired = log.repair_line_files().await?;
        let compacted = log.compact_stale(Utc::now().date_naive()).await;

        info!(
            path = %log.config.base_dir.display(),
            repaired,
            compacted,
            "Event log opened"
        );

        Ok(log)
    }

    /// Append an entry to today's partition for the given category
    ///
    /// Crossing into a new UTC date compacts the previous day's line files
    /// before the first append of the new day.
    pub async fn append(&self, category: LogCategory, entry: EventEntry) -> Result<(), StoreError> {
        let today = Utc::now().date_naive();
        self.rotate_if_new_day(today).await;
        self.append_at(PartitionKey { date: today, category }, entry)
            .await
    }

    /// Append an entry to an explicit partition
    pub async fn append_at(&self, key: PartitionKey, entry: EventEntry) -> Result<(), StoreError> {
        let lock = self.partition_lock(key);
        let _guard = lock.lock().await;

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.line_path(key))
            .await?;

        file.write_all(&line).await?;
        if self.config.sync_on_write {
            file.sync_data().await?;
        }

        debug!(partition = %key.file_stem(), "Appended log entry");
        Ok(())
    }

    /// Read all entries of a partition, materialized-then-active order
    ///
    /// Missing or unparseable content reads as empty.
    pub async fn read_partition(&self, key: PartitionKey) -> Vec<EventEntry> {
        let lock = self.partition_lock(key);
        let _guard = lock.lock().await;

        let mut entries = self.read_array(&self.array_path(key)).await;
        entries.extend(self.read_lines(&self.line_path(key)).await);
        entries
    }

    /// Materialize a partition into its external JSON-array form
    ///
    /// Merges the already-materialized array (if any) with the active line
    /// file, replaces the array file atomically, and removes the line file.
    /// Compacting a partition with no line file is a no-op. Returns the
    /// number of entries in the materialized array.
    pub async fn compact(&self, key: PartitionKey) -> Result<usize, StoreError> {
        let lock = self.partition_lock(key);
        let _guard = lock.lock().await;

        let line_path = self.line_path(key);
        let pending = match fs::metadata(&line_path).await {
            Ok(_) => self.read_lines(&line_path).await,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let array_path = self.array_path(key);
        let mut entries = self.read_array(&array_path).await;
        entries.extend(pending);

        let json = if self.config.pretty {
            serde_json::to_vec_pretty(&entries)?
        } else {
            serde_json::to_vec(&entries)?
        };

        // Replace atomically so a reader never sees a partial array
        let temp_path = array_path.with_extension("json.tmp");

        let mut file = File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &array_path).await?;

        fs::remove_file(&line_path).await?;

        debug!(
            partition = %key.file_stem(),
            entries = entries.len(),
            "Compacted partition"
        );

        Ok(entries.len())
    }

    /// Path of the materialized array file, e.g. `2026-08-07-pixel.json`
    pub fn array_path(&self, key: PartitionKey) -> PathBuf {
        self.config.base_dir.join(format!("{}.json", key.file_stem()))
    }

    /// Path of the active line file, e.g. `2026-08-07-pixel.jsonl`
    pub fn line_path(&self, key: PartitionKey) -> PathBuf {
        self.config.base_dir.join(format!("{}.jsonl", key.file_stem()))
    }

    /// Compact the previous day's partitions when the date rolls over
    async fn rotate_if_new_day(&self, today: NaiveDate) {
        let mut active = self.active_date.lock().await;
        if *active == Some(today) {
            return;
        }
        *active = Some(today);
        drop(active);

        let compacted = self.compact_stale(today).await;
        if compacted > 0 {
            info!(compacted, "Rotated closed partitions");
        }
    }

    /// Compact every line file belonging to a partition older than `today`
    ///
    /// Best-effort: a partition that fails to compact is left in line form
    /// and retried on the next rotation.
    async fn compact_stale(&self, today: NaiveDate) -> usize {
        let mut compacted = 0;
        for key in self.line_partitions().await {
            if key.date < today {
                match self.compact(key).await {
                    Ok(_) => compacted += 1,
                    Err(e) => {
                        warn!(partition = %key.file_stem(), error = %e, "Failed to compact partition");
                    }
                }
            }
        }
        compacted
    }

    /// Keys of all partitions that currently have a line file
    async fn line_partitions(&self) -> Vec<PartitionKey> {
        let mut keys = Vec::new();

        let mut entries = match fs::read_dir(&self.config.base_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to scan log directory");
                return keys;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(PartitionKey::from_file_stem)
            {
                keys.push(key);
            }
        }

        keys
    }

    /// Truncate torn trailing lines left by a crash mid-append
    ///
    /// A line file that does not end in a newline lost its tail; everything
    /// after the last complete entry is dropped so later appends cannot be
    /// glued onto the torn fragment.
    async fn repair_line_files(&self) -> Result<usize, StoreError> {
        let mut repaired = 0;

        for key in self.line_partitions().await {
            let path = self.line_path(key);
            let raw = match fs::read(&path).await {
                Ok(raw) => raw,
                Err(_) => continue,
            };

            if raw.is_empty() || raw.ends_with(b"\n") {
                continue;
            }

            let keep = raw.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
            warn!(
                partition = %key.file_stem(),
                dropped = raw.len() - keep,
                "Truncating torn trailing line"
            );

            let temp_path = path.with_extension("jsonl.tmp");
            let mut file = File::create(&temp_path).await?;
            file.write_all(&raw[..keep]).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &path).await?;

            repaired += 1;
        }

        Ok(repaired)
    }

    /// Defensive read of a materialized array file
    async fn read_array(&self, path: &Path) -> Vec<EventEntry> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read partition");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<EventEntry>>(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Corrupt partition, treating as empty"
                );
                Vec::new()
            }
        }
    }

    /// Defensive read of an active line file
    ///
    /// Stops at the first unparseable line, truncating the view to the
    /// previous complete entry.
    async fn read_lines(&self, path: &Path) -> Vec<EventEntry> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read partition");
                return Vec::new();
            }
        };

        let mut entries = Vec::new();
        for line in raw.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<EventEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Torn log line, stopping read"
                    );
                    break;
                }
            }
        }
        entries
    }

    fn partition_lock(&self, key: PartitionKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

//! Pixel delivery engine
//!
//! The state machine that executes one of four timing behaviors against an
//! output sink, emitting an event for every transition:
//!
//! - **basic**: write, close, done
//! - **lazy**: wait, then write and close; a disconnect during the wait
//!   skips the write entirely
//! - **step**: write and close immediately; a detached timer records a
//!   followup event later, independent of the connection
//! - **stream**: write once, then tick on a fixed cadence until the peer
//!   disconnects or a hard ceiling elapses
//!
//! Every timer is owned by the delivery task that armed it, and the only
//! cancellation signal is the peer-disconnect token. Sink close is
//! idempotent, so the race between a timeout and a disconnect collapses to
//! a no-op on whichever side loses.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use pixelping_core::{PixelId, PixelMode, pixel_png};

use crate::recorder::EventRecorder;
use crate::sink::PixelSink;

/// Timing configuration for the delivery engine
///
/// Defaults are the production timings; tests run the same state machine
/// on a shorter clock.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Delay before a lazy pixel writes its payload
    pub lazy_delay: Duration,
    /// Delay before a step pixel records its followup event
    pub step_followup_delay: Duration,
    /// Cadence of stream tick events
    pub stream_tick_interval: Duration,
    /// Hard ceiling on one stream session
    pub stream_max_duration: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            lazy_delay: Duration::from_millis(2000),
            step_followup_delay: Duration::from_millis(5000),
            stream_tick_interval: Duration::from_millis(1000),
            stream_max_duration: Duration::from_millis(15000),
        }
    }
}

/// Transient state of one in-flight stream delivery
///
/// Exists only while the stream loop runs; destroyed when the session ends
/// by timeout or disconnect. Never persisted.
#[derive(Debug)]
pub struct DeliverySession {
    /// Pixel being streamed
    pub pixel_id: PixelId,
    /// When the session opened
    pub started_at: DateTime<Utc>,
    /// Ticks elapsed so far
    pub elapsed_seconds: u64,
    /// Whether the peer disconnected before the ceiling
    pub cancelled: bool,
}

impl DeliverySession {
    fn new(pixel_id: PixelId) -> Self {
        Self {
            pixel_id,
            started_at: Utc::now(),
            elapsed_seconds: 0,
            cancelled: false,
        }
    }
}

/// Fetch-time mode resolution
///
/// A stored registry mode wins; otherwise a recognized explicit parameter;
/// otherwise `Basic`. This is deliberate graceful degradation, distinct
/// from the hard `InvalidMode` error the generation path raises.
pub fn resolve_mode(stored: Option<PixelMode>, requested: Option<&str>) -> PixelMode {
    if let Some(mode) = stored {
        return mode;
    }
    requested
        .and_then(|s| s.parse().ok())
        .unwrap_or(PixelMode::Basic)
}

/// Executes pixel deliveries and drives the event recorder
pub struct DeliveryEngine {
    recorder: Arc<EventRecorder>,
    config: DeliveryConfig,
}

impl DeliveryEngine {
    /// Create an engine recording through the given recorder
    pub fn new(recorder: Arc<EventRecorder>, config: DeliveryConfig) -> Self {
        Self { recorder, config }
    }

    /// Engine timings (exposed for generation responses)
    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Deliver one pixel
    ///
    /// Never fails: the mode is already validated, logging failures are
    /// contained in the recorder, and sink races are absorbed as no-ops.
    pub async fn deliver(
        &self,
        mode: PixelMode,
        pixel_id: PixelId,
        client_ip: &str,
        sink: Arc<dyn PixelSink>,
        cancel: CancellationToken,
    ) {
        debug!(pixel_id = %pixel_id, mode = %mode, "Starting delivery");

        match mode {
            PixelMode::Basic => self.deliver_basic(pixel_id, client_ip, sink).await,
            PixelMode::Lazy => self.deliver_lazy(pixel_id, client_ip, sink, cancel).await,
            PixelMode::Step => self.deliver_step(pixel_id, client_ip, sink).await,
            PixelMode::Stream => self.deliver_stream(pixel_id, client_ip, sink, cancel).await,
        }
    }

    /// `Init -> Served`: one write, close, one loaded event
    async fn deliver_basic(&self, id: PixelId, ip: &str, sink: Arc<dyn PixelSink>) {
        self.recorder.basic_loaded(id, ip).await;
        sink.write(pixel_png()).await;
        sink.close().await;
    }

    /// `Init -> (wait) -> Served`; a disconnect during the wait skips the
    /// write and suppresses the loaded event
    async fn deliver_lazy(
        &self,
        id: PixelId,
        ip: &str,
        sink: Arc<dyn PixelSink>,
        cancel: CancellationToken,
    ) {
        self.recorder.lazy_init(id, ip).await;

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(pixel_id = %id, "Lazy delivery cancelled during wait");
            }
            _ = tokio::time::sleep(self.config.lazy_delay) => {
                self.recorder.lazy_loaded(id, ip).await;
                sink.write(pixel_png()).await;
                sink.close().await;
            }
        }
    }

    /// `Init -> Served -> (wait) -> Followup`
    ///
    /// The client sees an instant response; the followup timer is detached
    /// from the response stream and fires regardless of connection state.
    async fn deliver_step(&self, id: PixelId, ip: &str, sink: Arc<dyn PixelSink>) {
        self.recorder.step_init(id, ip).await;
        sink.write(pixel_png()).await;
        sink.close().await;

        let recorder = Arc::clone(&self.recorder);
        let delay = self.config.step_followup_delay;
        let ip = ip.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            recorder.step_followup(id, &ip).await;
        });
    }

    /// `Init -> Streaming -> Closed`
    ///
    /// Ticks on a fixed cadence, racing the disconnect token against the
    /// session ceiling. Both exit paths converge on a single close and a
    /// single closed event.
    async fn deliver_stream(
        &self,
        id: PixelId,
        ip: &str,
        sink: Arc<dyn PixelSink>,
        cancel: CancellationToken,
    ) {
        self.recorder.stream_init(id, ip).await;
        sink.write(pixel_png()).await;

        let mut session = DeliverySession::new(id);
        let mut ticker = tokio::time::interval(self.config.stream_tick_interval);
        ticker.tick().await; // the first tick completes immediately

        let deadline = tokio::time::sleep(self.config.stream_max_duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    session.cancelled = true;
                    break;
                }
                _ = &mut deadline => break,
                _ = ticker.tick() => {
                    session.elapsed_seconds += 1;
                    self.recorder.stream_tick(id, ip, session.elapsed_seconds).await;
                }
            }
        }

        sink.close().await;
        self.recorder
            .stream_closed(id, ip, session.elapsed_seconds)
            .await;

        debug!(
            pixel_id = %id,
            cancelled = session.cancelled,
            seconds = session.elapsed_seconds,
            "Stream session ended"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pixelping_core::LogCategory;
    use pixelping_store::{EventLog, EventLogConfig, PartitionKey};
    use tempfile::TempDir;

    use crate::sink::RecordingSink;

    /// Short clock for tests; same state machine as production
    fn test_config() -> DeliveryConfig {
        DeliveryConfig {
            lazy_delay: Duration::from_millis(120),
            step_followup_delay: Duration::from_millis(120),
            stream_tick_interval: Duration::from_millis(40),
            stream_max_duration: Duration::from_millis(200),
        }
    }

    async fn create_engine() -> (Arc<DeliveryEngine>, Arc<EventLog>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = EventLogConfig {
            base_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        let log = Arc::new(EventLog::new(config).await.unwrap());
        let recorder = Arc::new(EventRecorder::new(Arc::clone(&log)));
        let engine = Arc::new(DeliveryEngine::new(recorder, test_config()));
        (engine, log, temp_dir)
    }

    async fn pixel_events(log: &EventLog) -> Vec<String> {
        let key = PartitionKey {
            date: Utc::now().date_naive(),
            category: LogCategory::Pixel,
        };
        log.read_partition(key)
            .await
            .into_iter()
            .map(|e| e.event)
            .collect()
    }

    #[tokio::test]
    async fn test_basic_writes_once_and_closes() {
        let (engine, log, _temp) = create_engine().await;
        let sink = RecordingSink::new();
        let id = PixelId::new();

        engine
            .deliver(
                PixelMode::Basic,
                id,
                "10.0.0.1",
                sink.clone(),
                CancellationToken::new(),
            )
            .await;

        let writes = sink.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], pixel_png());
        assert!(sink.is_closed());

        assert_eq!(pixel_events(&log).await, vec!["basic_pixel_loaded"]);
    }

    #[tokio::test]
    async fn test_lazy_writes_only_after_delay() {
        let (engine, log, _temp) = create_engine().await;
        let sink = RecordingSink::new();
        let id = PixelId::new();

        let handle = {
            let engine = Arc::clone(&engine);
            let sink = sink.clone();
            tokio::spawn(async move {
                engine
                    .deliver(PixelMode::Lazy, id, "10.0.0.1", sink, CancellationToken::new())
                    .await;
            })
        };

        // Well before the delay: init logged, nothing written
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(sink.writes().await.is_empty());
        assert!(!sink.is_closed());

        handle.await.unwrap();

        assert_eq!(sink.writes().await.len(), 1);
        assert!(sink.is_closed());
        assert_eq!(
            pixel_events(&log).await,
            vec!["lazy_pixel_init", "lazy_pixel_loaded"]
        );
    }

    #[tokio::test]
    async fn test_lazy_cancelled_skips_write_and_loaded_event() {
        let (engine, log, _temp) = create_engine().await;
        let sink = RecordingSink::new();
        let cancel = CancellationToken::new();
        let id = PixelId::new();

        let handle = {
            let engine = Arc::clone(&engine);
            let sink = sink.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                engine
                    .deliver(PixelMode::Lazy, id, "10.0.0.1", sink, cancel)
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();

        // Give any stray timer a chance to misfire before asserting
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(sink.writes().await.is_empty());
        assert_eq!(pixel_events(&log).await, vec!["lazy_pixel_init"]);
    }

    #[tokio::test]
    async fn test_step_serves_immediately_and_follows_up() {
        let (engine, log, _temp) = create_engine().await;
        let sink = RecordingSink::new();
        let id = PixelId::new();

        engine
            .deliver(
                PixelMode::Step,
                id,
                "10.0.0.1",
                sink.clone(),
                CancellationToken::new(),
            )
            .await;

        // Delivery returns with the payload already written and closed
        assert_eq!(sink.writes().await.len(), 1);
        assert!(sink.is_closed());
        assert_eq!(pixel_events(&log).await, vec!["step_pixel_init"]);

        // The followup fires later, on its own detached timer
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            pixel_events(&log).await,
            vec!["step_pixel_init", "step_pixel_followup"]
        );
    }

    #[tokio::test]
    async fn test_step_followup_fires_even_when_cancelled() {
        let (engine, log, _temp) = create_engine().await;
        let sink = RecordingSink::new();
        let cancel = CancellationToken::new();
        let id = PixelId::new();

        // Peer is already gone before delivery starts
        cancel.cancel();

        engine
            .deliver(PixelMode::Step, id, "10.0.0.1", sink.clone(), cancel)
            .await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        let events = pixel_events(&log).await;
        assert!(events.contains(&"step_pixel_followup".to_string()));
    }

    #[tokio::test]
    async fn test_stream_ticks_then_hits_ceiling() {
        let (engine, log, _temp) = create_engine().await;
        let sink = RecordingSink::new();
        let id = PixelId::new();

        let start = std::time::Instant::now();
        engine
            .deliver(
                PixelMode::Stream,
                id,
                "10.0.0.1",
                sink.clone(),
                CancellationToken::new(),
            )
            .await;
        let elapsed = start.elapsed();

        // Session never exceeds the ceiling (with scheduling slack)
        assert!(elapsed < Duration::from_millis(400));

        assert_eq!(sink.writes().await.len(), 1);
        assert!(sink.is_closed());

        let events = pixel_events(&log).await;
        assert_eq!(events.first().map(String::as_str), Some("stream_pixel_init"));
        assert_eq!(events.last().map(String::as_str), Some("stream_closed"));

        let ticks = events.iter().filter(|e| *e == "stream_tick").count();
        // 200ms ceiling / 40ms cadence: ~5 ticks, allow scheduling slack
        assert!((3..=5).contains(&ticks), "unexpected tick count {ticks}");

        let closed = events.iter().filter(|e| *e == "stream_closed").count();
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn test_stream_disconnect_closes_once() {
        let (engine, log, _temp) = create_engine().await;
        let sink = RecordingSink::new();
        let cancel = CancellationToken::new();
        let id = PixelId::new();

        let handle = {
            let engine = Arc::clone(&engine);
            let sink = sink.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                engine
                    .deliver(PixelMode::Stream, id, "10.0.0.1", sink, cancel)
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        // Cancelling twice must not produce a second closed event
        cancel.cancel();
        handle.await.unwrap();

        assert!(sink.is_closed());

        let events = pixel_events(&log).await;
        let closed = events.iter().filter(|e| *e == "stream_closed").count();
        assert_eq!(closed, 1);

        // Disconnect beat the ceiling: some ticks, but fewer than the maximum
        let ticks = events.iter().filter(|e| *e == "stream_tick").count();
        assert!(ticks < 5, "expected early termination, got {ticks} ticks");
    }

    #[tokio::test]
    async fn test_stream_close_is_idempotent_against_sink_races() {
        let (engine, _log, _temp) = create_engine().await;
        let sink = RecordingSink::new();
        let id = PixelId::new();

        // Sink already closed by the transport side before the session ends
        let handle = {
            let engine = Arc::clone(&engine);
            let sink = sink.clone();
            tokio::spawn(async move {
                engine
                    .deliver(PixelMode::Stream, id, "10.0.0.1", sink, CancellationToken::new())
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(60)).await;
        sink.close().await;
        handle.await.unwrap();

        // Engine's close on top of the transport's close: both counted, no panic
        assert_eq!(sink.close_calls(), 2);
    }

    #[test]
    fn test_resolve_mode_registry_wins() {
        let mode = resolve_mode(Some(PixelMode::Stream), Some("basic"));
        assert_eq!(mode, PixelMode::Stream);
    }

    #[test]
    fn test_resolve_mode_falls_back_to_query() {
        let mode = resolve_mode(None, Some("lazy"));
        assert_eq!(mode, PixelMode::Lazy);
    }

    #[test]
    fn test_resolve_mode_defaults_to_basic() {
        assert_eq!(resolve_mode(None, None), PixelMode::Basic);
        assert_eq!(resolve_mode(None, Some("bogus")), PixelMode::Basic);
    }
}

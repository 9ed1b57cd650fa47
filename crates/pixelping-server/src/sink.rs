//! Output sinks for pixel delivery
//!
//! [`PixelSink`] is the seam between the delivery engine and the transport.
//! [`ChannelSink`] feeds an HTTP response body through an mpsc channel;
//! [`RecordingSink`] is an in-memory double for exercising the engine in
//! tests without a network.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};

/// Output sink one delivery writes into
///
/// `close` is idempotent and `write` after close is a silent no-op. Both
/// properties absorb the race between a delivery timer firing and the peer
/// disconnecting; neither side ever observes an error from the other.
#[async_trait]
pub trait PixelSink: Send + Sync {
    /// Write a chunk toward the client; ignored once the sink is closed
    async fn write(&self, bytes: Bytes);

    /// Close the sink; closing an already-closed sink is a no-op
    async fn close(&self);

    /// Whether the sink has been closed
    fn is_closed(&self) -> bool;
}

/// Sink feeding an HTTP response body
///
/// Writes go into a bounded mpsc channel whose receiving half backs the
/// response body stream. Closing drops the sender, which ends the body.
/// A send failing because the receiver is gone means the peer already
/// disconnected; the failure is swallowed.
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    closed: AtomicBool,
}

impl ChannelSink {
    /// Create a sink and the receiving half for the response body
    pub fn new(buffer: usize) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(buffer);
        let sink = Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
        });
        (sink, rx)
    }
}

#[async_trait]
impl PixelSink for ChannelSink {
    async fn write(&self, bytes: Bytes) {
        let guard = self.tx.lock().await;
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(bytes).await;
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.tx.lock().await.take();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-memory sink recording writes and closes, for tests
pub struct RecordingSink {
    writes: Mutex<Vec<Bytes>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl RecordingSink {
    /// Create a fresh recording sink
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            writes: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        })
    }

    /// Chunks written so far
    pub async fn writes(&self) -> Vec<Bytes> {
        self.writes.lock().await.clone()
    }

    /// How many times `close` was invoked (idempotence checks)
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PixelSink for RecordingSink {
    async fn write(&self, bytes: Bytes) {
        if self.is_closed() {
            return;
        }
        self.writes.lock().await.push(bytes);
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_write_then_close() {
        let (sink, mut rx) = ChannelSink::new(4);

        sink.write(Bytes::from_static(b"payload")).await;
        sink.close().await;

        assert_eq!(rx.recv().await, Some(Bytes::from_static(b"payload")));
        // Sender dropped: stream ends
        assert_eq!(rx.recv().await, None);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_channel_sink_write_after_close_is_noop() {
        let (sink, mut rx) = ChannelSink::new(4);

        sink.close().await;
        sink.write(Bytes::from_static(b"late")).await;

        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_channel_sink_double_close_is_noop() {
        let (sink, _rx) = ChannelSink::new(4);

        sink.close().await;
        sink.close().await;
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_channel_sink_write_to_dropped_receiver_is_swallowed() {
        let (sink, rx) = ChannelSink::new(4);
        drop(rx);

        // Peer is gone; write must not panic or error
        sink.write(Bytes::from_static(b"payload")).await;
        assert!(!sink.is_closed());
    }

    #[tokio::test]
    async fn test_recording_sink_tracks_writes_and_closes() {
        let sink = RecordingSink::new();

        sink.write(Bytes::from_static(b"a")).await;
        sink.close().await;
        sink.write(Bytes::from_static(b"b")).await;
        sink.close().await;

        assert_eq!(sink.writes().await.len(), 1);
        assert_eq!(sink.close_calls(), 2);
        assert!(sink.is_closed());
    }
}

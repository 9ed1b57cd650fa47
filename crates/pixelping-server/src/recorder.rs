//! Event recorder
//!
//! Typed API translating domain occurrences into structured log entries.
//! One method per occurrence; each derives a stable machine event name and
//! a human-readable description, then appends a single entry to the event
//! log under the right category.
//!
//! The recorder is the containment boundary for persistence failures: a
//! failed append is reported to the diagnostic log and swallowed, never
//! propagated back into the delivery path. Delivery must never fail
//! because logging failed.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::warn;

use pixelping_core::{EventEntry, LogCategory, PixelId, PixelMode};
use pixelping_store::EventLog;

/// Request metadata already extracted from the transport
///
/// The recorder never sees raw transport objects; the HTTP layer parses
/// headers into this plain record first.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Remote peer address (best effort)
    pub ip: String,
    /// User-Agent header, if any
    pub user_agent: Option<String>,
    /// Referer header, if any
    pub referer: Option<String>,
    /// Query parameters of the originating request
    pub query: Option<Value>,
}

impl RequestMeta {
    fn user_agent_or_unknown(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("unknown")
    }

    fn referer_or_direct(&self) -> &str {
        self.referer.as_deref().unwrap_or("direct")
    }
}

/// Translates domain occurrences into event log entries
pub struct EventRecorder {
    log: Arc<EventLog>,
}

impl EventRecorder {
    /// Create a recorder writing to the given log
    pub fn new(log: Arc<EventLog>) -> Self {
        Self { log }
    }

    /// Append one entry, containing any persistence failure
    async fn record(
        &self,
        category: LogCategory,
        event: &str,
        description: String,
        fields: Map<String, Value>,
    ) {
        let entry = EventEntry::new(event, description, fields);
        if let Err(e) = self.log.append(category, entry).await {
            warn!(event, error = %e, "Failed to persist log entry");
        }
    }

    /// A pixel was generated and its URL handed to the caller
    pub async fn pixel_generated(&self, id: PixelId, mode: PixelMode, meta: &RequestMeta) {
        let mut fields = pixel_fields(id, mode, &meta.ip);
        fields.insert("userAgent".into(), json!(meta.user_agent_or_unknown()));
        fields.insert("referer".into(), json!(meta.referer_or_direct()));
        if let Some(query) = &meta.query {
            fields.insert("query".into(), query.clone());
        }
        self.record(
            LogCategory::Pixel,
            "pixel_generated",
            format!(
                "New pixel of type '{mode}' was generated and served to client at {}",
                meta.ip
            ),
            fields,
        )
        .await;
    }

    /// A pixel generation request arrived
    pub async fn pixel_request(&self, id: PixelId, mode: PixelMode, meta: &RequestMeta) {
        let mut fields = pixel_fields(id, mode, &meta.ip);
        fields.insert("userAgent".into(), json!(meta.user_agent_or_unknown()));
        fields.insert("referer".into(), json!(meta.referer_or_direct()));
        if let Some(query) = &meta.query {
            fields.insert("query".into(), query.clone());
        }
        self.record(
            LogCategory::Pixel,
            "pixel_request",
            format!("Pixel request received for {mode} pixel"),
            fields,
        )
        .await;
    }

    /// A basic pixel was served
    pub async fn basic_loaded(&self, id: PixelId, ip: &str) {
        self.record(
            LogCategory::Pixel,
            "basic_pixel_loaded",
            "Basic pixel was successfully loaded and served to the client".to_string(),
            pixel_fields(id, PixelMode::Basic, ip),
        )
        .await;
    }

    /// A lazy delivery started its wait
    pub async fn lazy_init(&self, id: PixelId, ip: &str) {
        self.record(
            LogCategory::Pixel,
            "lazy_pixel_init",
            "Lazy pixel initialization started - will load after delay".to_string(),
            pixel_fields(id, PixelMode::Lazy, ip),
        )
        .await;
    }

    /// A lazy delivery wrote its payload after the delay
    pub async fn lazy_loaded(&self, id: PixelId, ip: &str) {
        self.record(
            LogCategory::Pixel,
            "lazy_pixel_loaded",
            "Lazy pixel successfully loaded after delay".to_string(),
            pixel_fields(id, PixelMode::Lazy, ip),
        )
        .await;
    }

    /// A step delivery served its payload
    pub async fn step_init(&self, id: PixelId, ip: &str) {
        self.record(
            LogCategory::Pixel,
            "step_pixel_init",
            "Step pixel initialization started - followup will trigger after delay".to_string(),
            pixel_fields(id, PixelMode::Step, ip),
        )
        .await;
    }

    /// A step delivery's followup timer fired
    pub async fn step_followup(&self, id: PixelId, ip: &str) {
        self.record(
            LogCategory::Pixel,
            "step_pixel_followup",
            "Step pixel followup completed after delay".to_string(),
            pixel_fields(id, PixelMode::Step, ip),
        )
        .await;
    }

    /// A stream delivery opened
    pub async fn stream_init(&self, id: PixelId, ip: &str) {
        self.record(
            LogCategory::Pixel,
            "stream_pixel_init",
            "Stream pixel initialized - will stream until closed".to_string(),
            pixel_fields(id, PixelMode::Stream, ip),
        )
        .await;
    }

    /// A stream delivery ticked
    pub async fn stream_tick(&self, id: PixelId, ip: &str, seconds: u64) {
        let mut fields = pixel_fields(id, PixelMode::Stream, ip);
        fields.insert("seconds".into(), json!(seconds));
        self.record(
            LogCategory::Pixel,
            "stream_tick",
            format!("Stream pixel active - {seconds} second(s) elapsed"),
            fields,
        )
        .await;
    }

    /// A stream delivery ended (disconnect or ceiling)
    pub async fn stream_closed(&self, id: PixelId, ip: &str, total_seconds: u64) {
        let mut fields = pixel_fields(id, PixelMode::Stream, ip);
        fields.insert("totalSeconds".into(), json!(total_seconds));
        self.record(
            LogCategory::Pixel,
            "stream_closed",
            format!("Stream pixel closed after {total_seconds} second(s) of streaming"),
            fields,
        )
        .await;
    }

    /// A caller-submitted custom event
    pub async fn custom_event(&self, name: &str, mut fields: Map<String, Value>, ip: &str) {
        fields.insert("eventName".into(), json!(name));
        fields.insert("ip".into(), json!(ip));
        self.record(
            LogCategory::Pixel,
            "custom_event",
            format!("Custom event '{name}' triggered from IP {ip}"),
            fields,
        )
        .await;
    }

    /// A transport-level request completed
    #[allow(clippy::too_many_arguments)] // One field per extracted primitive
    pub async fn api_request(
        &self,
        method: &str,
        path: &str,
        ip: &str,
        user_agent: Option<&str>,
        status_code: u16,
        response_time_ms: u64,
        body_size: Option<usize>,
    ) {
        let mut fields = Map::new();
        fields.insert("method".into(), json!(method));
        fields.insert("path".into(), json!(path));
        fields.insert("ip".into(), json!(ip));
        fields.insert("userAgent".into(), json!(user_agent.unwrap_or("unknown")));
        fields.insert("statusCode".into(), json!(status_code));
        fields.insert("responseTimeMs".into(), json!(response_time_ms));
        if let Some(size) = body_size {
            fields.insert("bodySize".into(), json!(size));
        }
        self.record(
            LogCategory::Api,
            "api_request",
            format!(
                "API request {method} {path} completed with status {status_code} in {response_time_ms}ms"
            ),
            fields,
        )
        .await;
    }

    /// An internal error worth an audit trail entry
    pub async fn error(&self, message: &str, mut details: Map<String, Value>, ip: &str) {
        details.insert("ip".into(), json!(ip));
        details.insert("error".into(), json!(message));
        self.record(
            LogCategory::Pixel,
            "error",
            format!("An error occurred: {message}"),
            details,
        )
        .await;
    }
}

/// Common fields every pixel lifecycle event carries
fn pixel_fields(id: PixelId, mode: PixelMode, ip: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("pixelType".into(), json!(mode));
    fields.insert("pixelId".into(), json!(id));
    fields.insert("ip".into(), json!(ip));
    fields
}

//! HTTP transport
//!
//! The axum boundary. Handlers parse request metadata into plain records,
//! call into the registry/recorder/engine, and stream pixel bodies.
//! Dropping a pixel response body (how the transport observes a client
//! disconnect) cancels that delivery's token, which is the engine's only
//! cancellation signal.

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use futures_lite::Stream;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::cors::CorsLayer;

use pixelping_core::{PixelId, PixelMode, build_pixel_url_with_mode};

use crate::delivery::{DeliveryEngine, resolve_mode};
use crate::recorder::{EventRecorder, RequestMeta};
use crate::registry::PixelRegistry;
use crate::sink::ChannelSink;

/// Shared state behind every route handler
#[derive(Clone)]
pub struct AppState {
    /// Pixel registry
    pub registry: Arc<PixelRegistry>,
    /// Event recorder
    pub recorder: Arc<EventRecorder>,
    /// Delivery engine
    pub engine: Arc<DeliveryEngine>,
    /// Public base address used when composing pixel URLs
    pub public_base_url: String,
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/event", post(record_event))
        .route("/pixel/{type}", get(generate_pixel))
        .route("/pixel/serve/{pixel_id}", get(serve_pixel))
        .route("/health", get(health))
        .route("/self-ping", get(self_ping))
        .layer(middleware::from_fn_with_state(state.clone(), log_api_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Pixel response body
///
/// Streams chunks from the delivery sink. The guard cancels the delivery
/// token when the body is dropped, turning a transport-level disconnect
/// into the engine's one-shot cancellation signal.
struct PixelBody {
    rx: mpsc::Receiver<Bytes>,
    _disconnect: DropGuard,
}

impl Stream for PixelBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|chunk| chunk.map(Ok))
    }
}

/// Query parameters of the serve route
#[derive(Debug, Deserialize)]
struct ServeParams {
    /// Explicit mode fallback for when no registry record exists
    #[serde(rename = "type")]
    pixel_type: Option<String>,
}

/// `GET /pixel/{type}` — allocate a pixel and return its URL as JSON
async fn generate_pixel(
    State(state): State<AppState>,
    Path(pixel_type): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mode = match pixel_type.parse::<PixelMode>() {
        Ok(mode) => mode,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Invalid pixel type",
                    "validTypes": PixelMode::valid_names(),
                })),
            )
                .into_response();
        }
    };

    let meta = request_meta(&headers, &query);
    let id = state.registry.generate(mode, &meta.ip);

    state.recorder.pixel_generated(id, mode, &meta).await;
    state.recorder.pixel_request(id, mode, &meta).await;

    let mut body = Map::new();
    body.insert("success".into(), json!(true));
    body.insert("pixelType".into(), json!(mode));
    body.insert("pixelId".into(), json!(id));
    body.insert(
        "pixelUrl".into(),
        json!(build_pixel_url_with_mode(&state.public_base_url, &id, mode)),
    );
    body.insert("description".into(), json!(mode.description()));
    body.insert("format".into(), json!("json"));

    let timings = state.engine.config();
    match mode {
        PixelMode::Basic => {}
        PixelMode::Lazy => {
            body.insert(
                "delayMs".into(),
                json!(timings.lazy_delay.as_millis() as u64),
            );
        }
        PixelMode::Step => {
            body.insert(
                "followupDelayMs".into(),
                json!(timings.step_followup_delay.as_millis() as u64),
            );
        }
        PixelMode::Stream => {
            body.insert(
                "tickIntervalMs".into(),
                json!(timings.stream_tick_interval.as_millis() as u64),
            );
            body.insert(
                "maxDurationMs".into(),
                json!(timings.stream_max_duration.as_millis() as u64),
            );
        }
    }

    Json(Value::Object(body)).into_response()
}

/// `GET /pixel/serve/{pixel_id}` — stream the pixel bytes
///
/// Mode resolution: the registry record wins, then a recognized `?type=`
/// parameter, then basic. An unparseable identifier is re-minted for
/// logging; its record cannot exist, so the same fallback applies.
async fn serve_pixel(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(params): Query<ServeParams>,
    headers: HeaderMap,
) -> Response {
    let ip = client_ip(&headers);

    let pixel_id = match raw_id.parse::<PixelId>() {
        Ok(id) => id,
        Err(e) => {
            let mut details = Map::new();
            details.insert("pixelId".into(), json!(raw_id));
            state
                .recorder
                .error(&format!("Unparseable pixel id: {e}"), details, &ip)
                .await;
            PixelId::new()
        }
    };
    let stored = state.registry.lookup(&pixel_id).map(|record| record.mode);
    let mode = resolve_mode(stored, params.pixel_type.as_deref());

    let (sink, rx) = ChannelSink::new(4);
    let cancel = CancellationToken::new();
    let body = PixelBody {
        rx,
        _disconnect: cancel.clone().drop_guard(),
    };

    let engine = Arc::clone(&state.engine);
    tokio::spawn(async move {
        engine.deliver(mode, pixel_id, &ip, sink, cancel).await;
    });

    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// `POST /event` — record a caller-submitted custom event
async fn record_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let ip = client_ip(&headers);

    let name = body
        .get("event")
        .or_else(|| body.get("eventName"))
        .and_then(Value::as_str)
        .unwrap_or("custom_event")
        .to_string();

    let fields = match body {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("payload".into(), other);
            map
        }
    };

    state.recorder.custom_event(&name, fields, &ip).await;

    Json(json!({ "ok": true }))
}

/// `GET /health` — liveness probe
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "pixelping",
        "timestamp": chrono::Utc::now(),
    }))
}

/// `GET /self-ping` — keepalive target
async fn self_ping() -> Json<Value> {
    Json(json!({ "message": "Server is alive!" }))
}

/// Record every request/response pair into the api partition
async fn log_api_request(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let ip = client_ip(request.headers());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body_size = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|size| *size > 0);

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    state
        .recorder
        .api_request(
            &method,
            &path,
            &ip,
            user_agent.as_deref(),
            response.status().as_u16(),
            elapsed_ms,
            body_size,
        )
        .await;

    response
}

/// Best-effort client address from forwarding headers
///
/// The service sits behind a proxy in deployment; the first
/// `X-Forwarded-For` hop is the peer, with `X-Real-IP` as a fallback.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parse transport headers into the plain record the recorder accepts
fn request_meta(headers: &HeaderMap, query: &HashMap<String, String>) -> RequestMeta {
    RequestMeta {
        ip: client_ip(headers),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        referer: headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        query: if query.is_empty() {
            None
        } else {
            Some(json!(query))
        },
    }
}

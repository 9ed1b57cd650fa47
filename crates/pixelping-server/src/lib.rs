//! # PixelPing Server
//!
//! The web-beacon delivery service: hands a 1×1 transparent PNG to clients
//! under four timing modes and records every request/response transition as
//! a structured event.
//!
//! Components:
//!
//! - **[`registry`]**: bounded short-lived mapping from pixel identifier to
//!   delivery mode, with size-triggered eviction
//! - **[`recorder`]**: typed API translating domain occurrences into log
//!   entries; logging failures never propagate into delivery
//! - **[`delivery`]**: the mode state machine owning all timers and
//!   cancellation handling
//! - **[`sink`]**: the output seam between the engine and the transport
//! - **[`http`]**: the axum route surface
//! - **[`config`]**: server configuration with environment overrides

pub mod config;
pub mod delivery;
pub mod http;
pub mod recorder;
pub mod registry;
pub mod sink;

// Re-exports
pub use config::ServerConfig;
pub use delivery::{DeliveryConfig, DeliveryEngine, DeliverySession, resolve_mode};
pub use http::{AppState, router};
pub use recorder::{EventRecorder, RequestMeta};
pub use registry::{PixelRegistry, RegistryConfig};
pub use sink::{ChannelSink, PixelSink, RecordingSink};

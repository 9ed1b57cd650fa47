//! # PixelPing Core
//!
//! Shared domain types for the PixelPing web-beacon service.
//!
//! This crate defines the vocabulary the rest of the workspace speaks:
//!
//! - **[`PixelMode`]**: the closed set of delivery timing behaviors
//! - **[`PixelId`] / [`PixelRecord`]**: pixel identity and registry records
//! - **[`EventEntry`] / [`LogCategory`]**: structured log entries and the
//!   stream categories they are partitioned under
//! - **[`PixelError`]**: the caller-visible error taxonomy
//! - **[`url`]**: pure composition of public pixel-fetch URLs
//! - **[`png`]**: the transparent 1×1 payload every delivery writes

pub mod error;
pub mod event;
pub mod mode;
pub mod pixel;
pub mod png;
pub mod url;

// Re-exports
pub use error::PixelError;
pub use event::{EventEntry, LogCategory};
pub use mode::PixelMode;
pub use pixel::{PixelId, PixelRecord};
pub use png::pixel_png;
pub use url::{build_pixel_url, build_pixel_url_with_mode, trim_base};

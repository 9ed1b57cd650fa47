//! Pixel URL composition
//!
//! Pure functions, no state. A malformed (empty) base address degrades to a
//! root-relative path rather than failing.

use crate::mode::PixelMode;
use crate::pixel::PixelId;

/// Strip trailing slashes from a configured base address
pub fn trim_base(raw: &str) -> &str {
    raw.trim_end_matches('/')
}

/// Public fetch URL for a pixel
pub fn build_pixel_url(base: &str, id: &PixelId) -> String {
    format!("{}/pixel/serve/{}", trim_base(base), id)
}

/// Fetch URL carrying an explicit mode
///
/// The embedded `type` parameter keeps the URL servable after the registry
/// record has been evicted.
pub fn build_pixel_url_with_mode(base: &str, id: &PixelId, mode: PixelMode) -> String {
    format!("{}/pixel/serve/{}?type={}", trim_base(base), id, mode)
}

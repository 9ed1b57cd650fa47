//! The 1×1 transparent PNG payload

use std::sync::LazyLock;

use base64::Engine;
use bytes::Bytes;

/// Base64-encoded 1×1 transparent PNG
const PIXEL_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR4nGNgYAAAAAMAASsJTYQAAAAASUVORK5CYII=";

static PIXEL_PNG: LazyLock<Bytes> = LazyLock::new(|| {
    Bytes::from(
        base64::engine::general_purpose::STANDARD
            .decode(PIXEL_PNG_BASE64)
            .expect("embedded pixel payload is valid base64"),
    )
});

/// The transparent 1×1 PNG written on every pixel delivery
///
/// Cheap to call; the returned `Bytes` shares the decoded buffer.
pub fn pixel_png() -> Bytes {
    PIXEL_PNG.clone()
}

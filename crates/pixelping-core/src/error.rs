//! Error types for PixelPing

use thiserror::Error;

/// Caller-visible errors in the pixel service
#[derive(Debug, Error)]
pub enum PixelError {
    /// An unrecognized pixel mode was supplied at generation time.
    ///
    /// This is a hard caller error. It is never stored and never silently
    /// coerced to a default mode; the fetch path has its own fallback
    /// policy instead.
    #[error("Invalid pixel type: {0}")]
    InvalidMode(String),

    /// No registry record exists for the given pixel identifier.
    ///
    /// At fetch time this degrades to the fallback mode rather than
    /// failing the request.
    #[error("Pixel not found: {0}")]
    NotFound(String),
}

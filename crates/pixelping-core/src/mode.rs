//! Pixel delivery modes
//!
//! The mode determines the timing behavior of one pixel delivery. The set
//! is closed: dispatch over it is an exhaustive `match`, so an "unknown
//! mode" can only exist at the string-parsing boundary, never inside the
//! delivery engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PixelError;

/// Delivery timing behavior for a pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelMode {
    /// Single payload write, sink closed immediately
    Basic,
    /// Payload written after a fixed delay, skipped on disconnect
    Lazy,
    /// Payload written immediately, followup event recorded later
    Step,
    /// Payload written once, then periodic ticks until disconnect or ceiling
    Stream,
}

impl PixelMode {
    /// All recognized modes, in canonical order
    pub const ALL: [PixelMode; 4] = [Self::Basic, Self::Lazy, Self::Step, Self::Stream];

    /// Lowercase wire name of this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Lazy => "lazy",
            Self::Step => "step",
            Self::Stream => "stream",
        }
    }

    /// Human-readable description used in generation responses
    pub fn description(&self) -> &'static str {
        match self {
            Self::Basic => "Basic pixel - loads immediately when fetched",
            Self::Lazy => "Lazy pixel - loads after a fixed delay",
            Self::Step => "Step pixel - loads immediately, followup recorded after a delay",
            Self::Stream => "Stream pixel - streams and records ticks until closed",
        }
    }

    /// Wire names of all valid modes, for error payloads
    pub fn valid_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|m| m.as_str()).collect()
    }
}

impl fmt::Display for PixelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelMode {
    type Err = PixelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "lazy" => Ok(Self::Lazy),
            "step" => Ok(Self::Step),
            "stream" => Ok(Self::Stream),
            other => Err(PixelError::InvalidMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_valid_modes() {
        for mode in PixelMode::ALL {
            let parsed: PixelMode = mode.as_str().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn test_parse_unknown_mode_is_error() {
        let err = "bogus".parse::<PixelMode>().unwrap_err();
        assert!(matches!(err, PixelError::InvalidMode(_)));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        // Wire names are lowercase; anything else is a caller error
        assert!("Basic".parse::<PixelMode>().is_err());
        assert!("STREAM".parse::<PixelMode>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&PixelMode::Stream).unwrap();
        assert_eq!(json, "\"stream\"");

        let mode: PixelMode = serde_json::from_str("\"lazy\"").unwrap();
        assert_eq!(mode, PixelMode::Lazy);
    }

    #[test]
    fn test_valid_names() {
        assert_eq!(PixelMode::valid_names(), vec!["basic", "lazy", "step", "stream"]);
    }
}

//! Server configuration

use std::net::SocketAddr;

use pixelping_store::EventLogConfig;

use crate::delivery::DeliveryConfig;
use crate::registry::RegistryConfig;

/// Environment variable naming the public base address for pixel URLs
pub const BASE_URL_ENV: &str = "PIXELPING_BASE_URL";

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: SocketAddr,
    /// Public base address used when composing pixel URLs
    ///
    /// Empty means URLs are root-relative.
    pub public_base_url: String,
    /// Event log settings
    pub log: EventLogConfig,
    /// Pixel registry settings
    pub registry: RegistryConfig,
    /// Delivery engine timings
    pub delivery: DeliveryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            public_base_url: String::new(),
            log: EventLogConfig::default(),
            registry: RegistryConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base) = std::env::var(BASE_URL_ENV) {
            config.public_base_url = base;
        }
        config
    }
}

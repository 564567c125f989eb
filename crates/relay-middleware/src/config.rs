//! Middleware configuration from environment variables.

use relay_telemetry::parse_flag;
use std::env;

/// Which built-in units the core installs by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareConfig {
    /// Install the tracing unit
    pub tracing: bool,

    /// Install the logging unit
    pub logging: bool,

    /// Install the metrics unit (handler and publish side)
    pub metrics: bool,

    /// Install the panic recovery unit
    pub recovery: bool,

    /// Install the validation unit with this payload limit
    pub max_payload_bytes: Option<usize>,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            tracing: true,
            logging: true,
            metrics: true,
            recovery: true,
            max_payload_bytes: None,
        }
    }
}

impl MiddlewareConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RELAY_MW_TRACING`: Tracing unit (default: true)
    /// - `RELAY_MW_LOGGING`: Logging unit (default: true)
    /// - `RELAY_MW_METRICS`: Metrics unit (default: true)
    /// - `RELAY_MW_RECOVERY`: Panic recovery unit (default: true)
    /// - `RELAY_MW_MAX_PAYLOAD_BYTES`: Enables payload validation (default: unset)
    pub fn from_env() -> Self {
        let flag = |name: &str| env::var(name).map(|v| parse_flag(&v)).unwrap_or(true);

        Self {
            tracing: flag("RELAY_MW_TRACING"),
            logging: flag("RELAY_MW_LOGGING"),
            metrics: flag("RELAY_MW_METRICS"),
            recovery: flag("RELAY_MW_RECOVERY"),
            max_payload_bytes: env::var("RELAY_MW_MAX_PAYLOAD_BYTES")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
        }
    }

    /// No built-in units. Only units added through the builder run.
    pub fn bare() -> Self {
        Self {
            tracing: false,
            logging: false,
            metrics: false,
            recovery: false,
            max_payload_bytes: None,
        }
    }
}

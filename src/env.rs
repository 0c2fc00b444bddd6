//! Environment variable names used to configure capture from a host
//! service.
//!
//! These are purely helpers; [`CaptureConfig`] itself never reads the
//! environment unless [`CaptureConfig::from_env`] is called.

use crate::error::InitError;
use crate::init::CaptureConfig;
use crate::record::Severity;

/// Minimum level captured, e.g. `info` or `warning`.
pub const CHROMELOGGER_MIN_LEVEL_ENV: &str = "CHROMELOGGER_MIN_LEVEL";

/// Cap on the encoded header value in bytes; `0` disables it.
pub const CHROMELOGGER_MAX_HEADER_BYTES_ENV: &str = "CHROMELOGGER_MAX_HEADER_BYTES";

/// `true`/`false`: also print records to the console.
pub const CHROMELOGGER_STDOUT_ENV: &str = "CHROMELOGGER_STDOUT";

/// Comma-separated target prefixes to capture, e.g. `my_app::auth,billing`.
pub const CHROMELOGGER_TARGETS_ENV: &str = "CHROMELOGGER_TARGETS";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl CaptureConfig {
    /// Build a config from the process environment, starting from the
    /// defaults.
    pub fn from_env() -> Result<Self, InitError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, InitError> {
        let mut config = CaptureConfig::default();

        if let Some(value) = lookup(CHROMELOGGER_MIN_LEVEL_ENV) {
            config.min_severity = Severity::from_name(&value).ok_or(InitError::InvalidEnv {
                key: CHROMELOGGER_MIN_LEVEL_ENV,
                value,
            })?;
        }

        if let Some(value) = lookup(CHROMELOGGER_MAX_HEADER_BYTES_ENV) {
            config.max_header_bytes = value.trim().parse().map_err(|_| InitError::InvalidEnv {
                key: CHROMELOGGER_MAX_HEADER_BYTES_ENV,
                value: value.clone(),
            })?;
        }

        if let Some(value) = lookup(CHROMELOGGER_STDOUT_ENV) {
            config.enable_stdout = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(InitError::InvalidEnv {
                        key: CHROMELOGGER_STDOUT_ENV,
                        value,
                    })
                }
            };
        }

        if let Some(value) = lookup(CHROMELOGGER_TARGETS_ENV) {
            config.targets = value
                .split(',')
                .map(str::trim)
                .filter(|target| !target.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(config)
    }
}

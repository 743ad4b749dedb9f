//! Application configuration.
//!
//! Strongly-typed configuration loaded with Figment from two sources, in
//! precedence order:
//! 1. `labhal.toml` (or an explicit path)
//! 2. Environment variables prefixed with `LABHAL_` (nested keys separated
//!    by `__`, e.g. `LABHAL_APPLICATION__LOG_LEVEL=debug`)
//!
//! Every field has a default, so an empty deployment works with no file at
//! all.

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HalConfig {
    /// Application-level settings.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Device scan defaults.
    #[serde(default)]
    pub scan: ScanConfig,
    /// Acquisition defaults.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
}

/// Application-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name, used in log output.
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

/// How many channels a scan creates on simulated devices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Logic channel count.
    #[serde(default = "default_logic_channels")]
    pub logic_channels: usize,
    /// Analog channel count.
    #[serde(default = "default_analog_channels")]
    pub analog_channels: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            logic_channels: default_logic_channels(),
            analog_channels: default_analog_channels(),
        }
    }
}

/// Acquisition defaults applied before any explicit configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: u64,
    /// Scheduler tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: default_sample_rate(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

fn default_app_name() -> String {
    "labhal".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_logic_channels() -> usize {
    8
}

fn default_analog_channels() -> usize {
    4
}

fn default_sample_rate() -> u64 {
    200_000
}

fn default_tick_interval() -> u64 {
    25
}

impl HalConfig {
    /// Load from `labhal.toml` in the working directory plus environment.
    pub fn load() -> Result<Self> {
        Self::load_from("labhal.toml")
    }

    /// Load from an explicit file path plus environment. A missing file is
    /// fine; defaults and environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::from(Serialized::defaults(HalConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("LABHAL_").split("__"))
            .extract()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_a_file() {
        let config = HalConfig::load_from("/nonexistent/labhal.toml").unwrap();
        assert_eq!(config.application.name, "labhal");
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.scan.logic_channels, 8);
        assert_eq!(config.scan.analog_channels, 4);
        assert_eq!(config.acquisition.sample_rate_hz, 200_000);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[acquisition]\nsample_rate_hz = 1000\n\n[scan]\nanalog_channels = 2"
        )
        .unwrap();

        let config = HalConfig::load_from(file.path()).unwrap();
        assert_eq!(config.acquisition.sample_rate_hz, 1_000);
        assert_eq!(config.scan.analog_channels, 2);
        // Untouched sections keep their defaults.
        assert_eq!(config.scan.logic_channels, 8);
        assert_eq!(config.application.log_level, "info");
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[acquisition]\nsample_rate_hz = \"fast\"").unwrap();
        let err = HalConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, crate::HalError::Config(_)));
    }
}

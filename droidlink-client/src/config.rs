//! Client configuration.

use std::path::Path;
use std::time::Duration;

use droidlink_core::SessionParameters;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the headless client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Device bridge settings.
    pub adb: AdbConfig,
    /// Parameters for the device-side server.
    pub session: SessionParameters,
    /// Control channel behaviour.
    pub control: ControlConfig,
    /// Logging.
    pub logging: LoggingConfig,
    /// Teardown.
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbConfig {
    /// Path or name of the adb executable.
    pub program: String,
    /// Device serial; empty selects the only connected device.
    pub serial: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Switch the device display off once mirroring starts.
    pub turn_screen_off: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long the server process gets to exit before it is killed.
    pub process_timeout_ms: u64,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            program: "adb".into(),
            serial: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            process_timeout_ms: 1000,
        }
    }
}

impl ShutdownConfig {
    pub fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.process_timeout_ms)
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Default configuration rendered as TOML.
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }
}

// ── Tests ────────────────────────────────────────────────────────

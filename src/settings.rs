//! Process settings: a TOML file with every field defaulted, overridden by CLI flags.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [engine]
//! tick_interval_ms = 1000
//!
//! [detection]
//! bufferingThresholdMs = 750
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detection::DetectionConfig;
use crate::error::{MonitorError, Result};
use crate::ingest::buffer::{DEFAULT_SIMULATION_BATCH, DEFAULT_SIMULATION_FLUSH, DEFAULT_WINDOW_CAPACITY};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TICK_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: DEFAULT_HOST.to_string(), port: DEFAULT_PORT }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Cadence and sizing of the ingestion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub tick_interval_ms: u64,
    pub window_capacity: usize,
    pub simulation_batch_size: usize,
    pub simulation_flush_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_MS,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            simulation_batch_size: DEFAULT_SIMULATION_BATCH,
            simulation_flush_ms: DEFAULT_SIMULATION_FLUSH.as_millis() as u64,
        }
    }
}

impl EngineSettings {
    /// Zero is treated as one millisecond; `tokio::time::interval` rejects a zero period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn simulation_flush(&self) -> Duration {
        Duration::from_millis(self.simulation_flush_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub engine: EngineSettings,
    pub detection: DetectionConfig,
}

impl Settings {
    /// Parse settings from TOML text. Missing sections and keys take defaults.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| MonitorError::SettingsParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Read and parse a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| MonitorError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&text, path)?;
        info!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.server.bind_addr(), "0.0.0.0:3000");
        assert_eq!(s.engine.tick_interval(), Duration::from_secs(1));
        assert_eq!(s.engine.window_capacity, 100);
        assert_eq!(s.engine.simulation_batch_size, 3);
        assert_eq!(s.engine.simulation_flush(), Duration::from_millis(3_000));
        assert_eq!(s.detection, DetectionConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 9000\n\n[engine]\ntick_interval_ms = 250\n\n[detection]\nbufferingThresholdMs = 750.0\nmin_sample_size = 5"
        )
        .unwrap();

        let s = Settings::load(file.path()).unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, DEFAULT_HOST);
        assert_eq!(s.engine.tick_interval_ms, 250);
        assert_eq!(s.engine.window_capacity, 100);
        assert_eq!(s.detection.buffering_threshold_ms, 750.0);
        assert_eq!(s.detection.min_sample_size, 5);
        assert_eq!(s.detection.quality_degradation_threshold, 0.5);
    }

    #[test]
    fn test_empty_file_is_default() {
        let file = NamedTempFile::new().unwrap();
        assert_eq!(Settings::load(file.path()).unwrap(), Settings::default());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, MonitorError::SettingsIo { .. }));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"not a number\"").unwrap();
        let err = Settings::load(file.path()).unwrap_err();
        assert!(matches!(err, MonitorError::SettingsParse { .. }));
    }

    #[test]
    fn test_zero_tick_clamped() {
        let e = EngineSettings { tick_interval_ms: 0, ..Default::default() };
        assert_eq!(e.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_no_path_gives_defaults() {
        assert_eq!(Settings::load_or_default(None).unwrap(), Settings::default());
    }
}

//! Tunable detection thresholds and the partial-update patch applied to them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

// ---------------------------------------------------------------------------
// DetectionConfig
// ---------------------------------------------------------------------------

/// Thresholds read by every detector on every evaluation.
///
/// No range validation happens here; out-of-range values take effect as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionConfig {
    /// Buffer length below which an entry counts as "low buffer".
    #[serde(alias = "buffering_threshold_ms")]
    pub buffering_threshold_ms: f64,
    /// Fractional bitrate drop (0..1) between consecutive readings that counts as significant.
    #[serde(alias = "quality_degradation_threshold")]
    pub quality_degradation_threshold: f64,
    /// Startup deadline above which startup is considered slow.
    #[serde(alias = "startup_delay_threshold_ms")]
    pub startup_delay_threshold_ms: f64,
    /// `(max - min) / max * 100` of throughput above which a session is flagged.
    #[serde(alias = "bandwidth_fluctuation_threshold_percent")]
    pub bandwidth_fluctuation_threshold_percent: f64,
    /// Batches smaller than this produce nothing (unless forced).
    #[serde(alias = "min_sample_size")]
    pub min_sample_size: usize,
    /// Reported to clients; not consulted by the detectors.
    #[serde(alias = "analysis_window_size_ms")]
    pub analysis_window_size_ms: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            buffering_threshold_ms: 500.0,
            quality_degradation_threshold: 0.5,
            startup_delay_threshold_ms: 2000.0,
            bandwidth_fluctuation_threshold_percent: 30.0,
            min_sample_size: 3,
            analysis_window_size_ms: 30_000,
        }
    }
}

impl DetectionConfig {
    /// Shallow-merge `patch` over `self`. Absent fields keep their current value.
    pub fn merged(&self, patch: &DetectionConfigPatch) -> Self {
        Self {
            buffering_threshold_ms: patch
                .buffering_threshold_ms
                .unwrap_or(self.buffering_threshold_ms),
            quality_degradation_threshold: patch
                .quality_degradation_threshold
                .unwrap_or(self.quality_degradation_threshold),
            startup_delay_threshold_ms: patch
                .startup_delay_threshold_ms
                .unwrap_or(self.startup_delay_threshold_ms),
            bandwidth_fluctuation_threshold_percent: patch
                .bandwidth_fluctuation_threshold_percent
                .unwrap_or(self.bandwidth_fluctuation_threshold_percent),
            min_sample_size: patch.min_sample_size.unwrap_or(self.min_sample_size),
            analysis_window_size_ms: patch
                .analysis_window_size_ms
                .unwrap_or(self.analysis_window_size_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// DetectionConfigPatch
// ---------------------------------------------------------------------------

/// Partial [`DetectionConfig`] as sent by a configuration request.
///
/// All fields are optional. Absent fields are omitted from the serialized
/// JSON body and leave the live value untouched when merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffering_threshold_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_degradation_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_delay_threshold_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth_fluctuation_threshold_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_sample_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_window_size_ms: Option<u64>,
}

impl DetectionConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// ConfigStore
// ---------------------------------------------------------------------------

/// Holds the single current [`DetectionConfig`].
///
/// Readers get an `Arc` snapshot that stays valid and unchanged even if an
/// update lands while they are still using it. The store itself is owned by
/// the engine task, so updates are serialized with ingestion and evaluation.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    current: Arc<DetectionConfig>,
}

impl ConfigStore {
    pub fn new(initial: DetectionConfig) -> Self {
        Self { current: Arc::new(initial) }
    }

    /// Immutable snapshot of the live config.
    pub fn snapshot(&self) -> Arc<DetectionConfig> {
        Arc::clone(&self.current)
    }

    /// Merge `patch` into the live config and return the new value.
    pub fn merge(&mut self, patch: &DetectionConfigPatch) -> Arc<DetectionConfig> {
        if !patch.is_empty() {
            self.current = Arc::new(self.current.merged(patch));
        }
        info!(config = ?self.current, "anomaly detection configuration updated");
        self.snapshot()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

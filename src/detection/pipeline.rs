//! Runs the detectors over one batch.

use tracing::{debug, info};

use super::buffering::BufferingDetector;
use super::bitrate::BitrateDetector;
use super::forced::{forced_anomaly, requests_forced};
use super::network::NetworkDetector;
use super::startup::StartupDetector;
use super::{DetectionConfig, Detector};
use crate::anomaly::Anomaly;
use crate::telemetry::TelemetryEntry;

/// Ordered set of detectors plus the forced fast path and the sample-size gate.
///
/// The pipeline holds no state between evaluations. Output is the
/// concatenation of each detector's output in registration order; nothing is
/// deduplicated.
pub struct DetectorPipeline {
    detectors: Vec<Box<dyn Detector>>,
}

impl Default for DetectorPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for DetectorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.detectors.iter().map(|d| d.name())).finish()
    }
}

impl DetectorPipeline {
    /// Buffering, bitrate, startup, network.
    pub fn standard() -> Self {
        Self::with_detectors(vec![
            Box::new(BufferingDetector),
            Box::new(BitrateDetector),
            Box::new(StartupDetector),
            Box::new(NetworkDetector),
        ])
    }

    pub fn with_detectors(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Evaluate one batch.
    ///
    /// `force` marks the whole batch as forced without touching the entries.
    /// A forced batch yields exactly one synthesized anomaly and skips both the
    /// gate and the detectors.
    pub fn evaluate(
        &self,
        batch: &[TelemetryEntry],
        config: &DetectionConfig,
        force: bool,
    ) -> Vec<Anomaly> {
        if force || requests_forced(batch) {
            let anomaly = forced_anomaly(batch);
            info!(kind = %anomaly.kind, severity = %anomaly.severity, "forced anomaly generated");
            return vec![anomaly];
        }

        if batch.len() < config.min_sample_size {
            debug!(
                batch = batch.len(),
                min_sample_size = config.min_sample_size,
                "batch below minimum sample size, skipping detection"
            );
            return Vec::new();
        }

        let mut anomalies = Vec::new();
        for detector in &self.detectors {
            let found = detector.detect(batch, config);
            if !found.is_empty() {
                debug!(detector = detector.name(), count = found.len(), "detector fired");
            }
            anomalies.extend(found);
        }

        if !anomalies.is_empty() {
            info!(batch = batch.len(), anomalies = anomalies.len(), "detected anomalies");
        }
        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{AnomalyType, Severity};
    use chrono::Utc;

    fn entry(sid: &str) -> TelemetryEntry {
        TelemetryEntry::new(Utc::now(), Some(sid.to_string()))
    }

    fn starved(sid: &str) -> TelemetryEntry {
        let mut e = entry(sid);
        e.buffer_starvation = Some(true);
        e
    }

    #[test]
    fn test_standard_order() {
        assert_eq!(
            DetectorPipeline::standard().detector_names(),
            vec!["buffering", "bitrate", "startup", "network"]
        );
    }

    #[test]
    fn test_gate_blocks_small_batch() {
        let p = DetectorPipeline::standard();
        let out = p.evaluate(&[starved("s"), starved("s")], &DetectionConfig::default(), false);
        assert!(out.is_empty());
    }

    #[test]
    fn test_gate_passes_at_min_size() {
        let p = DetectorPipeline::standard();
        let out = p.evaluate(
            &[starved("s"), starved("s"), entry("s")],
            &DetectionConfig::default(),
            false,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Critical);
    }

    #[test]
    fn test_forced_entry_bypasses_gate() {
        let mut e = entry("s");
        e.force_detection = true;
        e.anomaly_type = Some("BUFFERING".into());
        let out = DetectorPipeline::standard().evaluate(&[e], &DetectionConfig::default(), false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, AnomalyType::Buffering);
    }

    #[test]
    fn test_force_argument_skips_detectors() {
        let batch = vec![starved("s"), starved("s"), starved("s")];
        let out = DetectorPipeline::standard().evaluate(&batch, &DetectionConfig::default(), true);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, "Forced test anomaly for UI verification");
    }

    #[test]
    fn test_detector_order_in_output() {
        let mut batch = Vec::new();
        for (br, mtp) in [(8000.0, 10_000.0), (1000.0, 1_000.0), (8000.0, 9_000.0)] {
            let mut e = starved("s");
            e.bitrate_kbps = Some(br);
            e.measured_throughput_kbps = Some(mtp);
            batch.push(e);
        }
        let out = DetectorPipeline::standard().evaluate(&batch, &DetectionConfig::default(), false);
        let kinds: Vec<AnomalyType> = out.iter().map(|a| a.kind).collect();
        assert_eq!(kinds.first(), Some(&AnomalyType::Buffering));
        assert_eq!(kinds.last(), Some(&AnomalyType::NetworkIssue));
        assert!(kinds.contains(&AnomalyType::QualityDegradation));
    }

    #[test]
    fn test_custom_detector_set() {
        struct Always;
        impl Detector for Always {
            fn name(&self) -> &'static str {
                "always"
            }
            fn detect(&self, batch: &[TelemetryEntry], _: &DetectionConfig) -> Vec<Anomaly> {
                vec![Anomaly::new(
                    AnomalyType::CdnIssue,
                    Severity::Low,
                    "always",
                    &[],
                    serde_json::json!({ "sessionId": batch[0].session() }),
                )]
            }
        }
        let p = DetectorPipeline::with_detectors(vec![Box::new(Always)]);
        let config = DetectionConfig { min_sample_size: 1, ..Default::default() };
        let out = p.evaluate(&[entry("x")], &config, false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].session_id(), Some("x"));
    }
}

//! Throughput fluctuation and throughput/bitrate mismatch detection.

use serde_json::{json, Value};

use super::{group_by_session, DetectionConfig, Detector};
use crate::anomaly::{Anomaly, AnomalyType, Severity};
use crate::telemetry::TelemetryEntry;

/// Sessions need at least this many throughput readings for the fluctuation check.
pub const MIN_THROUGHPUT_READINGS: usize = 3;
/// Fluctuation above this percentage escalates to `high`.
pub const HIGH_FLUCTUATION_PERCENT: f64 = 50.0;
/// Throughput must be at least this multiple of the bitrate to be sufficient.
pub const SAFE_THROUGHPUT_RATIO: f64 = 1.5;
/// More than this many insufficient readings in a session is reported.
pub const MAX_INSUFFICIENT_READINGS: usize = 2;

/// `(max, min)` of the readings, or `None` when the maximum is not positive.
fn throughput_range(readings: &[f64]) -> Option<(f64, f64)> {
    let max = readings.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = readings.iter().copied().fold(f64::INFINITY, f64::min);
    if !max.is_finite() || max <= 0.0 {
        return None;
    }
    Some((max, min))
}

/// `(max - min) / max` as a percentage, or `None` when the maximum is not positive.
pub fn fluctuation_percent(readings: &[f64]) -> Option<f64> {
    throughput_range(readings).map(|(max, min)| (max - min) * 100.0 / max)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkDetector;

impl NetworkDetector {
    fn fluctuation(&self, sid: &str, entries: &[&TelemetryEntry], threshold: f64) -> Option<Anomaly> {
        let readings: Vec<f64> = entries.iter().filter_map(|e| e.measured_throughput_kbps).collect();
        if readings.len() < MIN_THROUGHPUT_READINGS {
            return None;
        }
        let (max, min) = throughput_range(&readings)?;
        let percent = (max - min) * 100.0 / max;
        if percent <= threshold {
            return None;
        }

        let severity = if percent > HIGH_FLUCTUATION_PERCENT {
            Severity::High
        } else {
            Severity::Medium
        };
        Some(
            Anomaly::new(
                AnomalyType::NetworkIssue,
                severity,
                format!("Network throughput fluctuation detected in session {sid}"),
                &["mtp", "rtp"],
                json!({
                    "sessionId": sid,
                    "fluctuationPercent": percent,
                    "maxThroughput": max,
                    "minThroughput": min,
                }),
            )
            .with_recommendation("Check network stability, consider using a more stable connection"),
        )
    }

    fn insufficient(&self, sid: &str, entries: &[&TelemetryEntry]) -> Option<Anomaly> {
        let ratios: Vec<Value> = entries
            .iter()
            .filter_map(|e| Some((e.measured_throughput_kbps?, e.bitrate_kbps?)))
            .filter(|&(mtp, br)| mtp < br * SAFE_THROUGHPUT_RATIO)
            .map(|(mtp, br)| {
                let ratio = if br == 0.0 { Value::Null } else { json!(mtp / br) };
                json!({ "throughput": mtp, "bitrate": br, "ratio": ratio })
            })
            .collect();
        if ratios.len() <= MAX_INSUFFICIENT_READINGS {
            return None;
        }

        Some(
            Anomaly::new(
                AnomalyType::NetworkIssue,
                Severity::High,
                format!("Throughput insufficient for selected bitrate in session {sid}"),
                &["mtp", "br"],
                json!({
                    "sessionId": sid,
                    "instances": ratios.len(),
                    "ratios": ratios,
                }),
            )
            .with_recommendation(
                "Reduce video quality, improve network conditions, or implement more conservative ABR",
            ),
        )
    }
}

impl Detector for NetworkDetector {
    fn name(&self) -> &'static str {
        "network"
    }

    fn detect(&self, batch: &[TelemetryEntry], config: &DetectionConfig) -> Vec<Anomaly> {
        let mut out = Vec::new();
        for (sid, entries) in group_by_session(batch).iter() {
            out.extend(self.fluctuation(sid, entries, config.bandwidth_fluctuation_threshold_percent));
            out.extend(self.insufficient(sid, entries));
        }
        out
    }
}

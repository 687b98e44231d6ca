//! Buffer starvation and low-buffer detection.

use serde_json::json;

use super::{group_by_session, DetectionConfig, Detector};
use crate::anomaly::{Anomaly, AnomalyType, Severity};
use crate::telemetry::TelemetryEntry;

/// Flags `bs=true` reports and buffer levels under `buffering_threshold_ms`.
///
/// Starvation: two or more in one session is `critical`, exactly one is
/// `medium`. Low buffer: one `low` anomaly per session listing every
/// qualifying reading. The two checks are independent.
#[derive(Debug, Default, Clone, Copy)]
pub struct BufferingDetector;

impl BufferingDetector {
    fn starvation(&self, batch: &[TelemetryEntry], out: &mut Vec<Anomaly>) {
        let groups = group_by_session(batch.iter().filter(|e| e.is_starved()));

        for (sid, entries) in groups.iter() {
            let anomaly = if entries.len() >= 2 {
                let timestamps: Vec<_> = entries.iter().map(|e| e.timestamp).collect();
                Anomaly::new(
                    AnomalyType::Buffering,
                    Severity::Critical,
                    format!("Frequent buffering detected in session {sid}"),
                    &["bs", "bl"],
                    json!({
                        "sessionId": sid,
                        "occurrences": entries.len(),
                        "timestamps": timestamps,
                    }),
                )
                .with_recommendation(
                    "Reduce video quality, check network conditions, or increase initial buffer size",
                )
            } else {
                Anomaly::new(
                    AnomalyType::Buffering,
                    Severity::Medium,
                    "Buffer starvation detected",
                    &["bs", "bl"],
                    json!({
                        "sessionId": sid,
                        "timestamp": entries[0].timestamp,
                    }),
                )
                .with_recommendation(
                    "Monitor for additional occurrences. If persistent, adjust ABR algorithm to be more conservative",
                )
            };
            out.push(anomaly);
        }
    }

    fn low_buffer(&self, batch: &[TelemetryEntry], threshold_ms: f64, out: &mut Vec<Anomaly>) {
        let groups = group_by_session(
            batch
                .iter()
                .filter(|e| e.buffer_length_ms.is_some_and(|bl| bl < threshold_ms)),
        );

        for (sid, entries) in groups.iter() {
            let levels: Vec<f64> = entries.iter().filter_map(|e| e.buffer_length_ms).collect();
            let timestamps: Vec<_> = entries.iter().map(|e| e.timestamp).collect();
            out.push(
                Anomaly::new(
                    AnomalyType::Buffering,
                    Severity::Low,
                    format!("Low buffer level detected in session {sid}"),
                    &["bl"],
                    json!({
                        "sessionId": sid,
                        "bufferLevels": levels,
                        "timestamps": timestamps,
                    }),
                )
                .with_recommendation(
                    "Monitor buffer trend. Consider pre-buffering more content or reducing bitrate",
                ),
            );
        }
    }
}

impl Detector for BufferingDetector {
    fn name(&self) -> &'static str {
        "buffering"
    }

    fn detect(&self, batch: &[TelemetryEntry], config: &DetectionConfig) -> Vec<Anomaly> {
        let mut out = Vec::new();
        self.starvation(batch, &mut out);
        self.low_buffer(batch, config.buffering_threshold_ms, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn e(sid: &str, bs: Option<bool>, bl: Option<f64>) -> TelemetryEntry {
        let mut e = TelemetryEntry::new(Utc::now(), Some(sid.to_string()));
        e.buffer_starvation = bs;
        e.buffer_length_ms = bl;
        e
    }

    fn run(batch: &[TelemetryEntry]) -> Vec<Anomaly> {
        BufferingDetector.detect(batch, &DetectionConfig::default())
    }

    #[test]
    fn test_two_starvations_one_critical() {
        let out = run(&[e("s", Some(true), None), e("s", Some(true), None), e("s", None, None)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Critical);
        assert_eq!(out[0].context["occurrences"], 2);
        assert_eq!(out[0].context["timestamps"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_single_starvation_medium() {
        let out = run(&[e("s", Some(true), None), e("s", Some(false), None)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Medium);
        assert_eq!(out[0].message, "Buffer starvation detected");
        assert_eq!(out[0].session_id(), Some("s"));
    }

    #[test]
    fn test_starvation_counted_per_session() {
        let out = run(&[e("a", Some(true), None), e("b", Some(true), None)]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|a| a.severity == Severity::Medium));
        assert_eq!(out[0].session_id(), Some("a"));
        assert_eq!(out[1].session_id(), Some("b"));
    }

    #[test]
    fn test_low_buffer_lists_all_readings() {
        let out = run(&[
            e("s", None, Some(100.0)),
            e("s", None, Some(4000.0)),
            e("s", None, Some(499.0)),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Low);
        assert_eq!(out[0].affected_metrics, vec!["bl"]);
        assert_eq!(out[0].context["bufferLevels"], json!([100.0, 499.0]));
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(run(&[e("s", None, Some(500.0))]).is_empty());
    }

    #[test]
    fn test_both_checks_fire_for_same_session() {
        let out = run(&[e("s", Some(true), Some(0.0)), e("s", Some(true), Some(0.0))]);
        let severities: Vec<Severity> = out.iter().map(|a| a.severity).collect();
        assert_eq!(severities, vec![Severity::Critical, Severity::Low]);
    }

    #[test]
    fn test_quiet_batch_yields_nothing() {
        assert!(run(&[e("s", Some(false), Some(8000.0)), e("s", None, None)]).is_empty());
    }
}

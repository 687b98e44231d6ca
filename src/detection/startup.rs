//! Startup frequency and startup delay detection.

use serde_json::json;

use super::{group_by_session, DetectionConfig, Detector};
use crate::anomaly::{Anomaly, AnomalyType, Severity};
use crate::telemetry::TelemetryEntry;

/// More than this many startup events in one session is treated as repeated restarts.
pub const MAX_STARTUPS_PER_SESSION: usize = 2;

/// Looks at entries with `su=true` only.
///
/// Repeated startups and slow startups are reported independently, so one
/// session can produce both.
#[derive(Debug, Default, Clone, Copy)]
pub struct StartupDetector;

impl Detector for StartupDetector {
    fn name(&self) -> &'static str {
        "startup"
    }

    fn detect(&self, batch: &[TelemetryEntry], config: &DetectionConfig) -> Vec<Anomaly> {
        let mut out = Vec::new();
        let groups = group_by_session(batch.iter().filter(|e| e.is_startup()));

        for (sid, entries) in groups.iter() {
            if entries.len() > MAX_STARTUPS_PER_SESSION {
                let timestamps: Vec<_> = entries.iter().map(|e| e.timestamp).collect();
                out.push(
                    Anomaly::new(
                        AnomalyType::StartupDelay,
                        Severity::High,
                        format!("Multiple startup events detected in session {sid}"),
                        &["su", "dl"],
                        json!({
                            "sessionId": sid,
                            "startupCount": entries.len(),
                            "timestamps": timestamps,
                        }),
                    )
                    .with_recommendation(
                        "Optimize initial segment delivery, reduce initial quality, or pre-buffer more content",
                    ),
                );
            }

            let delays: Vec<f64> = entries
                .iter()
                .filter_map(|e| e.deadline_ms)
                .filter(|&dl| dl > config.startup_delay_threshold_ms)
                .collect();
            if !delays.is_empty() {
                out.push(
                    Anomaly::new(
                        AnomalyType::StartupDelay,
                        Severity::Medium,
                        format!("Long startup delay detected in session {sid}"),
                        &["dl", "su"],
                        json!({
                            "sessionId": sid,
                            "delays": delays,
                        }),
                    )
                    .with_recommendation("Optimize initial segment delivery or reduce initial quality"),
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn e(sid: &str, su: Option<bool>, dl: Option<f64>) -> TelemetryEntry {
        let mut e = TelemetryEntry::new(Utc::now(), Some(sid.to_string()));
        e.startup = su;
        e.deadline_ms = dl;
        e
    }

    fn run(batch: &[TelemetryEntry]) -> Vec<Anomaly> {
        StartupDetector.detect(batch, &DetectionConfig::default())
    }

    #[test]
    fn test_two_startups_not_flagged() {
        assert!(run(&[e("s", Some(true), None), e("s", Some(true), None)]).is_empty());
    }

    #[test]
    fn test_three_startups_high() {
        let out = run(&[
            e("s", Some(true), None),
            e("s", Some(true), None),
            e("s", Some(true), None),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::High);
        assert_eq!(out[0].context["startupCount"], 3);
        assert_eq!(out[0].affected_metrics, vec!["su", "dl"]);
    }

    #[test]
    fn test_slow_startup_lists_only_slow_delays() {
        let out = run(&[
            e("s", Some(true), Some(2500.0)),
            e("s", Some(true), Some(1000.0)),
            e("s", Some(false), Some(9000.0)),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Medium);
        assert_eq!(out[0].context["delays"], json!([2500.0]));
        assert_eq!(out[0].affected_metrics, vec!["dl", "su"]);
    }

    #[test]
    fn test_delay_at_threshold_not_flagged() {
        assert!(run(&[e("s", Some(true), Some(2000.0))]).is_empty());
    }

    #[test]
    fn test_repeated_and_slow_both_reported() {
        let out = run(&[
            e("s", Some(true), Some(3000.0)),
            e("s", Some(true), Some(100.0)),
            e("s", Some(true), None),
        ]);
        let severities: Vec<Severity> = out.iter().map(|a| a.severity).collect();
        assert_eq!(severities, vec![Severity::High, Severity::Medium]);
    }

    #[test]
    fn test_threshold_follows_config() {
        let config = DetectionConfig { startup_delay_threshold_ms: 50.0, ..Default::default() };
        let out = StartupDetector.detect(&[e("s", Some(true), Some(100.0))], &config);
        assert_eq!(out.len(), 1);
    }
}

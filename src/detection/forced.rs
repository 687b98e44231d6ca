//! Deterministic anomaly generation for demo and test traffic.
//!
//! When a batch is forced, the normal detectors are skipped and exactly one
//! anomaly is produced from the requested hint (`anomalyType` on an entry).
//! Hints are matched case-sensitively against the upper-snake names below;
//! anything else falls back to a simulated quality degradation.

use serde_json::json;

use crate::anomaly::{Anomaly, AnomalyType, Severity};
use crate::telemetry::{TelemetryEntry, UNKNOWN_SESSION};

/// The fixed mapping for one recognised hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForcedTemplate {
    pub kind: AnomalyType,
    pub severity: Severity,
    pub metrics: &'static [&'static str],
    pub message: &'static str,
    pub recommendation: &'static str,
}

const UNKNOWN_HINT: ForcedTemplate = ForcedTemplate {
    kind: AnomalyType::QualityDegradation,
    severity: Severity::Medium,
    metrics: &["br", "mtp"],
    message: "Simulated quality degradation detected",
    recommendation: "This is a simulated anomaly for testing purposes.",
};

/// Look up the template for a hint string.
pub fn template_for(hint: &str) -> ForcedTemplate {
    match hint {
        "BUFFERING" => ForcedTemplate {
            kind: AnomalyType::Buffering,
            severity: Severity::High,
            metrics: &["bs", "bl"],
            message: "Buffering issue detected",
            recommendation: "Check network conditions or reduce video quality.",
        },
        "QUALITY_DEGRADATION" => ForcedTemplate {
            kind: AnomalyType::QualityDegradation,
            severity: Severity::Medium,
            metrics: &["br", "mtp"],
            message: "Quality degradation detected",
            recommendation: "Bandwidth fluctuation detected. User experience may be impacted.",
        },
        "NETWORK_ISSUE" => ForcedTemplate {
            kind: AnomalyType::NetworkIssue,
            severity: Severity::High,
            metrics: &["mtp", "rtp", "bl"],
            message: "Network throughput issue detected",
            recommendation: "Network conditions deteriorated significantly.",
        },
        "STARTUP_DELAY" => ForcedTemplate {
            kind: AnomalyType::StartupDelay,
            severity: Severity::Medium,
            metrics: &["dl", "su"],
            message: "Excessive startup delay detected",
            recommendation: "Initial buffering is taking longer than expected.",
        },
        "PLAYBACK_STALL" => ForcedTemplate {
            kind: AnomalyType::PlaybackStall,
            severity: Severity::Critical,
            metrics: &["bs", "bl", "pr"],
            message: "Playback stalled",
            recommendation: "Video has stopped playing due to insufficient buffer.",
        },
        _ => UNKNOWN_HINT,
    }
}

/// True when any entry in `batch` asks for forced detection.
pub fn requests_forced(batch: &[TelemetryEntry]) -> bool {
    batch.iter().any(|e| e.force_detection)
}

/// Build the single forced anomaly for `batch`.
///
/// The session is taken from the last entry; the hint is the first
/// `anomalyType` found scanning from the front.
pub fn forced_anomaly(batch: &[TelemetryEntry]) -> Anomaly {
    let session = batch.last().map_or(UNKNOWN_SESSION, TelemetryEntry::session);
    let hint = batch.iter().find_map(|e| e.anomaly_type.as_deref());

    match hint {
        Some(hint) => {
            let t = template_for(hint);
            Anomaly::new(
                t.kind,
                t.severity,
                t.message,
                t.metrics,
                json!({
                    "sessionId": session,
                    "simulation": true,
                    "requestedType": hint,
                }),
            )
            .with_recommendation(t.recommendation)
        }
        None => Anomaly::new(
            AnomalyType::QualityDegradation,
            Severity::Medium,
            "Forced test anomaly for UI verification",
            &["br", "mtp"],
            json!({
                "sessionId": session,
                "note": "This is a test anomaly generated to verify UI functionality",
            }),
        )
        .with_recommendation("This is just a test anomaly. No action required."),
    }
}

/// Safety net for a simulation flush that produced nothing.
pub fn fallback_anomaly(session: &str) -> Anomaly {
    Anomaly::new(
        AnomalyType::QualityDegradation,
        Severity::Medium,
        "Simulated anomaly detected",
        &["br", "mtp"],
        json!({ "sessionId": session, "simulation": true }),
    )
    .with_recommendation(UNKNOWN_HINT.recommendation)
}

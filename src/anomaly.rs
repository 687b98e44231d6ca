//! # Anomaly model
//!
//! An [`Anomaly`] is one detection result. It is built once by a detector (or
//! the forced fast path), then handed to the emission sink and never touched
//! again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Severity + AnomalyType
// ---------------------------------------------------------------------------

/// Severity of a detected anomaly. Ordered `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth watching.
    Low,
    /// Viewer experience is likely affected.
    Medium,
    /// Viewer experience is degraded.
    High,
    /// Playback is failing.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low      => write!(f, "low"),
            Severity::Medium   => write!(f, "medium"),
            Severity::High     => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Category of a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Buffering,
    QualityDegradation,
    NetworkIssue,
    PlayerError,
    PlaybackStall,
    StartupDelay,
    AbnormalBitrate,
    BandwidthFluctuation,
    CdnIssue,
    SegmentError,
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnomalyType::Buffering            => "buffering",
            AnomalyType::QualityDegradation   => "quality_degradation",
            AnomalyType::NetworkIssue         => "network_issue",
            AnomalyType::PlayerError          => "player_error",
            AnomalyType::PlaybackStall        => "playback_stall",
            AnomalyType::StartupDelay         => "startup_delay",
            AnomalyType::AbnormalBitrate      => "abnormal_bitrate",
            AnomalyType::BandwidthFluctuation => "bandwidth_fluctuation",
            AnomalyType::CdnIssue             => "cdn_issue",
            AnomalyType::SegmentError         => "segment_error",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Anomaly
// ---------------------------------------------------------------------------

/// A detected quality-of-experience anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    /// Unique per emission (UUID v4).
    pub id: String,
    /// Detection time, not event time.
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: AnomalyType,
    pub severity: Severity,
    pub message: String,
    /// CMCD keys implicated, in a fixed order per anomaly kind.
    pub affected_metrics: Vec<String>,
    /// Free-form evidence: session id, counts, timestamps, ratios.
    pub context: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Anomaly {
    /// Build an anomaly stamped with a fresh id and the current time.
    pub fn new(
        kind: AnomalyType,
        severity: Severity,
        message: impl Into<String>,
        affected_metrics: &[&str],
        context: Value,
    ) -> Self {
        let context = match context {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            severity,
            message: message.into(),
            affected_metrics: affected_metrics.iter().map(|m| m.to_string()).collect(),
            context,
            recommendation: None,
        }
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    /// Session id recorded in the context, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.context.get("sessionId").and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Critical.to_string(), "critical");
        assert_eq!(Severity::Low.to_string(), "low");
    }

    #[test]
    fn test_anomaly_type_display_matches_serde() {
        for kind in [
            AnomalyType::Buffering,
            AnomalyType::QualityDegradation,
            AnomalyType::NetworkIssue,
            AnomalyType::PlayerError,
            AnomalyType::PlaybackStall,
            AnomalyType::StartupDelay,
            AnomalyType::AbnormalBitrate,
            AnomalyType::BandwidthFluctuation,
            AnomalyType::CdnIssue,
            AnomalyType::SegmentError,
        ] {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire, Value::String(kind.to_string()));
        }
    }

    #[test]
    fn test_anomaly_wire_shape() {
        let a = Anomaly::new(
            AnomalyType::StartupDelay,
            Severity::Medium,
            "slow start",
            &["dl", "su"],
            json!({ "sessionId": "s-9" }),
        )
        .with_recommendation("pre-buffer");

        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["type"], "startup_delay");
        assert_eq!(v["severity"], "medium");
        assert_eq!(v["affectedMetrics"], json!(["dl", "su"]));
        assert_eq!(v["context"]["sessionId"], "s-9");
        assert_eq!(v["recommendation"], "pre-buffer");
    }

    #[test]
    fn test_anomaly_ids_unique() {
        let a = Anomaly::new(AnomalyType::Buffering, Severity::Low, "", &[], Value::Null);
        let b = Anomaly::new(AnomalyType::Buffering, Severity::Low, "", &[], Value::Null);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_session_id_lookup() {
        let a = Anomaly::new(
            AnomalyType::NetworkIssue,
            Severity::High,
            "",
            &[],
            json!({ "sessionId": "abc" }),
        );
        assert_eq!(a.session_id(), Some("abc"));
        let b = Anomaly::new(AnomalyType::NetworkIssue, Severity::High, "", &[], json!(42));
        assert_eq!(b.session_id(), None);
        assert_eq!(b.context["value"], 42);
    }

    #[test]
    fn test_recommendation_omitted_when_none() {
        let a = Anomaly::new(AnomalyType::CdnIssue, Severity::Low, "m", &[], Value::Null);
        let v = serde_json::to_value(&a).unwrap();
        assert!(v.get("recommendation").is_none());
    }
}

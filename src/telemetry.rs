//! # CMCD telemetry entries
//!
//! One [`TelemetryEntry`] is one report from a playback client. Field names on
//! the wire are the CTA-5004 short keys (`br`, `bl`, `mtp`, ...) plus a few
//! analysis-only extensions and the control flags consumed by the ingestion
//! buffer.
//!
//! Entries are plain values. Once handed to the engine nothing mutates them.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Session id used when a client did not send `sid`.
pub const UNKNOWN_SESSION: &str = "unknown";

// ---------------------------------------------------------------------------
// CMCD enumerations
// ---------------------------------------------------------------------------

/// CMCD `ot`: the media type of the requested object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    #[serde(rename = "m")]
    Manifest,
    #[serde(rename = "a")]
    Audio,
    #[serde(rename = "v")]
    Video,
    #[serde(rename = "av")]
    Muxed,
    #[serde(rename = "i")]
    InitSegment,
    #[serde(rename = "c")]
    CaptionOrSubtitle,
    #[serde(rename = "tt")]
    TimedText,
    #[serde(rename = "k")]
    Key,
    #[serde(rename = "o")]
    Other,
}

/// CMCD `sf`: the streaming format in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamingFormat {
    #[serde(rename = "d")]
    Dash,
    #[serde(rename = "h")]
    Hls,
    #[serde(rename = "s")]
    Smooth,
    #[serde(rename = "o")]
    Other,
}

/// CMCD `st`: VOD or live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamType {
    #[serde(rename = "v")]
    Vod,
    #[serde(rename = "l")]
    Live,
}

/// Player state reported by analysis-aware clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Playing,
    Paused,
    Buffering,
    Ended,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Playing   => write!(f, "playing"),
            PlayerState::Paused    => write!(f, "paused"),
            PlayerState::Buffering => write!(f, "buffering"),
            PlayerState::Ended     => write!(f, "ended"),
        }
    }
}

// ---------------------------------------------------------------------------
// TelemetryEntry
// ---------------------------------------------------------------------------

/// A single CMCD report.
///
/// Every metric is optional; the detectors skip entries that do not carry the
/// metric they look at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEntry {
    /// Event time. Accepts RFC 3339 or epoch milliseconds; defaults to "now".
    #[serde(default = "Utc::now", deserialize_with = "flexible_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Session id (`sid`).
    #[serde(rename = "sid", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Content id (`cid`).
    #[serde(rename = "cid", default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,

    /// Encoded bitrate, kbps.
    #[serde(rename = "br", default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<f64>,
    /// Buffer length, ms.
    #[serde(rename = "bl", default, skip_serializing_if = "Option::is_none")]
    pub buffer_length_ms: Option<f64>,
    /// Buffer starvation since the previous request.
    #[serde(rename = "bs", default, skip_serializing_if = "Option::is_none")]
    pub buffer_starvation: Option<bool>,
    /// Object duration, ms.
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub object_duration_ms: Option<f64>,
    /// Deadline, ms.
    #[serde(rename = "dl", default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<f64>,
    /// Measured throughput, kbps.
    #[serde(rename = "mtp", default, skip_serializing_if = "Option::is_none")]
    pub measured_throughput_kbps: Option<f64>,
    /// Requested maximum throughput, kbps.
    #[serde(rename = "rtp", default, skip_serializing_if = "Option::is_none")]
    pub requested_throughput_kbps: Option<f64>,
    /// Next object request.
    #[serde(rename = "nor", default, skip_serializing_if = "Option::is_none")]
    pub next_object_request: Option<String>,
    /// Next range request.
    #[serde(rename = "nrr", default, skip_serializing_if = "Option::is_none")]
    pub next_range_request: Option<String>,
    #[serde(rename = "ot", default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<ObjectType>,
    /// Playback rate (1 = real time, 0 = not playing).
    #[serde(rename = "pr", default, skip_serializing_if = "Option::is_none")]
    pub playback_rate: Option<f64>,
    #[serde(rename = "sf", default, skip_serializing_if = "Option::is_none")]
    pub streaming_format: Option<StreamingFormat>,
    #[serde(rename = "st", default, skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<StreamType>,
    /// Object is urgently needed (startup, seek or recovery).
    #[serde(rename = "su", default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<bool>,
    /// Top bitrate available, kbps.
    #[serde(rename = "tb", default, skip_serializing_if = "Option::is_none")]
    pub top_bitrate_kbps: Option<f64>,
    /// CMCD version.
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_state: Option<PlayerState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Network latency, ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,

    // --- control metadata (ingestion buffer only) ---

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_simulation: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub one_shot: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force_detection: bool,
    /// Requested anomaly category for forced detection, e.g. `"BUFFERING"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_type: Option<String>,
}

impl TelemetryEntry {
    /// An entry carrying only a timestamp and an optional session id.
    pub fn new(timestamp: DateTime<Utc>, session_id: Option<String>) -> Self {
        Self {
            timestamp,
            session_id,
            content_id: None,
            bitrate_kbps: None,
            buffer_length_ms: None,
            buffer_starvation: None,
            object_duration_ms: None,
            deadline_ms: None,
            measured_throughput_kbps: None,
            requested_throughput_kbps: None,
            next_object_request: None,
            next_range_request: None,
            object_type: None,
            playback_rate: None,
            streaming_format: None,
            stream_type: None,
            startup: None,
            top_bitrate_kbps: None,
            version: None,
            resolution: None,
            player_state: None,
            error_code: None,
            latency: None,
            is_simulation: false,
            one_shot: false,
            force_detection: false,
            anomaly_type: None,
        }
    }

    /// Session id, or [`UNKNOWN_SESSION`] when absent or empty.
    pub fn session(&self) -> &str {
        match self.session_id.as_deref() {
            Some(s) if !s.is_empty() => s,
            _ => UNKNOWN_SESSION,
        }
    }

    pub fn is_starved(&self) -> bool {
        self.buffer_starvation == Some(true)
    }

    pub fn is_startup(&self) -> bool {
        self.startup == Some(true)
    }
}

// ---------------------------------------------------------------------------
// Timestamp decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Millis(i64),
    Text(String),
}

/// Accept either an RFC 3339 string or integer epoch milliseconds.
fn flexible_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match WireTimestamp::deserialize(deserializer)? {
        WireTimestamp::Millis(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {ms}"))),
        WireTimestamp::Text(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| D::Error::custom(format!("invalid timestamp '{s}': {e}"))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

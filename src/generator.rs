//! Synthetic CMCD traffic for demos and smoke tests.
//!
//! Produces plausible random entries plus a few short sessions that each
//! reproduce one known problem. Every function takes the RNG explicitly, so a
//! seeded `StdRng` gives repeatable output.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::telemetry::{ObjectType, PlayerState, StreamType, StreamingFormat, TelemetryEntry};

/// Encoding ladder, kbps.
pub const BITRATE_LADDER: [f64; 8] = [300.0, 500.0, 1000.0, 2000.0, 3000.0, 4500.0, 6000.0, 8000.0];

/// Bitrates used by the oscillation pattern.
pub const OSCILLATION_LEVELS: [f64; 6] = [6000.0, 3000.0, 6000.0, 2000.0, 5000.0, 2000.0];

pub const DEFAULT_GENERATE_COUNT: usize = 20;

const STREAMING_FORMATS: [StreamingFormat; 4] = [
    StreamingFormat::Dash,
    StreamingFormat::Hls,
    StreamingFormat::Smooth,
    StreamingFormat::Other,
];

const OBJECT_TYPES: [ObjectType; 9] = [
    ObjectType::Manifest,
    ObjectType::Audio,
    ObjectType::Video,
    ObjectType::Muxed,
    ObjectType::InitSegment,
    ObjectType::CaptionOrSubtitle,
    ObjectType::TimedText,
    ObjectType::Key,
    ObjectType::Other,
];

const PLAYER_STATES: [PlayerState; 4] =
    [PlayerState::Playing, PlayerState::Paused, PlayerState::Buffering, PlayerState::Ended];

const PLAYBACK_RATES: [f64; 4] = [0.0, 1.0, 1.5, 2.0];

/// A canned problem session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyPattern {
    /// Draining buffer, two starvations, then recovery at a lower bitrate.
    BufferStarvation,
    /// Bitrate bouncing between rungs.
    BitrateOscillation,
    /// Three startup requests with long deadlines.
    StartupDelay,
    /// Throughput collapses below the selected bitrate.
    ThroughputCollapse,
}

impl AnomalyPattern {
    pub const ALL: [AnomalyPattern; 4] = [
        AnomalyPattern::BufferStarvation,
        AnomalyPattern::BitrateOscillation,
        AnomalyPattern::StartupDelay,
        AnomalyPattern::ThroughputCollapse,
    ];
}

fn short_id<R: Rng + ?Sized>(rng: &mut R, prefix: &str, len: usize) -> String {
    let suffix: String = std::iter::repeat_with(|| char::from(rng.sample(Alphanumeric)).to_ascii_lowercase())
        .take(len)
        .collect();
    format!("{prefix}-{suffix}")
}

fn pick<R: Rng + ?Sized, T: Copy>(rng: &mut R, items: &[T], fallback: T) -> T {
    items.choose(rng).copied().unwrap_or(fallback)
}

pub fn session_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    short_id(rng, "session", 8)
}

pub fn content_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    short_id(rng, "content", 6)
}

/// One random entry. Fresh ids are drawn when `session` / `content` are `None`.
pub fn random_entry<R: Rng + ?Sized>(
    rng: &mut R,
    session: Option<&str>,
    content: Option<&str>,
    at: DateTime<Utc>,
) -> TelemetryEntry {
    let sid = session.map_or_else(|| session_id(rng), str::to_string);
    let cid = content.map_or_else(|| content_id(rng), str::to_string);
    let br = pick(rng, &BITRATE_LADDER, 3000.0);

    let mut e = TelemetryEntry::new(at, Some(sid));
    e.content_id = Some(cid);
    e.bitrate_kbps = Some(br);
    e.buffer_length_ms = Some(f64::from(rng.gen_range(1_000..=10_000u32)));
    e.streaming_format = Some(pick(rng, &STREAMING_FORMATS, StreamingFormat::Other));
    e.stream_type = Some(if rng.gen_bool(0.5) { StreamType::Vod } else { StreamType::Live });
    e.object_type = Some(pick(rng, &OBJECT_TYPES, ObjectType::Video));

    if rng.gen_bool(0.7) {
        e.object_duration_ms = Some(f64::from(rng.gen_range(2_000..=10_000u32)));
    }
    if rng.gen_bool(0.5) {
        let low = (br - 1000.0).max(300.0);
        e.measured_throughput_kbps = Some(rng.gen_range(low..=br + 3000.0).round());
    }
    if rng.gen_bool(0.2) {
        e.buffer_starvation = Some(true);
    }
    if rng.gen_bool(0.1) {
        e.startup = Some(true);
    }
    if rng.gen_bool(0.5) {
        e.playback_rate = Some(pick(rng, &PLAYBACK_RATES, 1.0));
    }
    if rng.gen_bool(0.3) {
        e.deadline_ms = Some(f64::from(rng.gen_range(500..=5_000u32)));
    }
    if rng.gen_bool(0.4) {
        e.requested_throughput_kbps = Some(rng.gen_range(br..=br * 3.0).round());
    }
    if rng.gen_bool(0.8) {
        e.player_state = Some(pick(rng, &PLAYER_STATES, PlayerState::Playing));
    }
    e
}

/// Entries for one session reproducing `kind`, timestamped from `start`.
pub fn pattern<R: Rng + ?Sized>(
    rng: &mut R,
    kind: AnomalyPattern,
    start: DateTime<Utc>,
) -> Vec<TelemetryEntry> {
    let sid = session_id(rng);
    let cid = content_id(rng);
    let at = |ms: i64| start + Duration::milliseconds(ms);
    let base = |rng: &mut R, ms: i64| random_entry(rng, Some(&sid), Some(&cid), at(ms));

    let mut out = Vec::new();
    match kind {
        AnomalyPattern::BufferStarvation => {
            for i in 0..3 {
                let mut e = base(rng, i * 1000);
                e.buffer_length_ms = Some(5000.0 - i as f64 * 1500.0);
                e.bitrate_kbps = Some(3000.0);
                e.buffer_starvation = None;
                out.push(e);
            }
            for i in 0..2 {
                let mut e = base(rng, 3000 + i * 1000);
                e.buffer_length_ms = Some(0.0);
                e.buffer_starvation = Some(true);
                e.player_state = Some(PlayerState::Buffering);
                out.push(e);
            }
            for i in 0..2 {
                let mut e = base(rng, 5000 + i * 1000);
                e.buffer_length_ms = Some((i + 1) as f64 * 1000.0);
                e.bitrate_kbps = Some(1000.0);
                e.buffer_starvation = None;
                e.player_state = Some(PlayerState::Playing);
                out.push(e);
            }
        }
        AnomalyPattern::BitrateOscillation => {
            for (i, &br) in OSCILLATION_LEVELS.iter().enumerate() {
                let mut e = base(rng, i as i64 * 1000);
                e.bitrate_kbps = Some(br);
                e.measured_throughput_kbps = Some(br + f64::from(rng.gen_range(-500..=1000i32)));
                out.push(e);
            }
        }
        AnomalyPattern::StartupDelay => {
            for i in 0..3 {
                let mut e = base(rng, i * 1500);
                e.startup = Some(true);
                e.deadline_ms = Some(5000.0 - i as f64 * 1000.0);
                e.player_state =
                    Some(if i < 2 { PlayerState::Buffering } else { PlayerState::Playing });
                out.push(e);
            }
        }
        AnomalyPattern::ThroughputCollapse => {
            for i in 0..2 {
                let mut e = base(rng, i * 1000);
                e.bitrate_kbps = Some(4000.0);
                e.measured_throughput_kbps = Some(8000.0);
                out.push(e);
            }
            for i in 0..3 {
                let mut e = base(rng, 2000 + i * 1000);
                e.bitrate_kbps = Some(4000.0);
                e.measured_throughput_kbps = Some(2500.0);
                out.push(e);
            }
        }
    }
    out
}

/// `count` random entries followed by two or three problem sessions.
pub fn generate<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<TelemetryEntry> {
    let now = Utc::now();
    let mut out: Vec<TelemetryEntry> = (0..count).map(|_| random_entry(rng, None, None, now)).collect();

    let patterns = rng.gen_range(2..=3);
    for _ in 0..patterns {
        let kind = pick(rng, &AnomalyPattern::ALL, AnomalyPattern::BufferStarvation);
        out.extend(pattern(rng, kind, now));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionConfig, DetectorPipeline};
    use crate::anomaly::AnomalyType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_ids_have_prefix() {
        let mut r = rng();
        let sid = session_id(&mut r);
        assert!(sid.starts_with("session-"));
        assert_eq!(sid.len(), "session-".len() + 8);
        assert!(content_id(&mut r).starts_with("content-"));
    }

    #[test]
    fn test_random_entry_ranges() {
        let mut r = rng();
        for _ in 0..200 {
            let e = random_entry(&mut r, Some("s"), None, Utc::now());
            assert_eq!(e.session(), "s");
            assert!(BITRATE_LADDER.contains(&e.bitrate_kbps.unwrap()));
            let bl = e.buffer_length_ms.unwrap();
            assert!((1000.0..=10_000.0).contains(&bl));
            assert!(!e.is_simulation && !e.one_shot && !e.force_detection);
        }
    }

    #[test]
    fn test_seeded_output_repeats() {
        let a = generate(&mut rng(), 5);
        let b = generate(&mut rng(), 5);
        let ids = |v: &[TelemetryEntry]| v.iter().map(|e| e.session().to_string()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn test_generate_count_plus_patterns() {
        let out = generate(&mut rng(), 20);
        // smallest pattern is 3 entries, largest 7
        assert!(out.len() >= 20 + 2 * 3);
        assert!(out.len() <= 20 + 3 * 7);
    }

    #[test]
    fn test_patterns_single_session() {
        let mut r = rng();
        for kind in AnomalyPattern::ALL {
            let entries = pattern(&mut r, kind, Utc::now());
            let first = entries[0].session().to_string();
            assert!(entries.iter().all(|e| e.session() == first));
        }
    }

    #[rstest::rstest]
    #[case(AnomalyPattern::BufferStarvation, AnomalyType::Buffering)]
    #[case(AnomalyPattern::BitrateOscillation, AnomalyType::BandwidthFluctuation)]
    #[case(AnomalyPattern::StartupDelay, AnomalyType::StartupDelay)]
    #[case(AnomalyPattern::ThroughputCollapse, AnomalyType::NetworkIssue)]
    fn test_pattern_triggers_detector(#[case] kind: AnomalyPattern, #[case] expected: AnomalyType) {
        let entries = pattern(&mut rng(), kind, Utc::now());
        let out = DetectorPipeline::standard().evaluate(&entries, &DetectionConfig::default(), false);
        assert!(out.iter().any(|a| a.kind == expected), "{kind:?} produced {out:?}");
    }
}

//! Bitrate drop and bitrate oscillation detection.

use serde_json::json;

use super::{group_by_session, DetectionConfig, Detector};
use crate::anomaly::{Anomaly, AnomalyType, Severity};
use crate::telemetry::TelemetryEntry;

/// Sessions need at least this many bitrate readings to be scored.
pub const MIN_BITRATE_READINGS: usize = 3;
/// Oscillation is only checked above this many readings.
pub const OSCILLATION_MIN_READINGS: usize = 5;
/// More than this many direction reversals is an oscillation.
pub const OSCILLATION_REVERSALS: usize = 2;
/// More than this many significant drops escalates to `high`.
pub const HIGH_SEVERITY_DROPS: usize = 2;

/// Count consecutive drops larger than `threshold` (fractional).
///
/// Returns the index of each dropping reading.
/// A zero reading is neither scored nor used as the reference for the next one.
pub fn significant_drops(bitrates: &[f64], threshold: f64) -> Vec<usize> {
    let mut previous: Option<f64> = None;
    let mut drops = Vec::new();

    for (i, &br) in bitrates.iter().enumerate() {
        if br == 0.0 {
            continue;
        }
        if let Some(prev) = previous {
            if (prev - br) / prev > threshold {
                drops.push(i);
            }
        }
        previous = Some(br);
    }
    drops
}

/// Count direction reversals over consecutive triplets. Flat steps never count.
pub fn direction_reversals(bitrates: &[f64]) -> usize {
    bitrates
        .windows(3)
        .filter(|w| {
            let d1 = sign(w[1] - w[0]);
            let d2 = sign(w[2] - w[1]);
            d1 != 0 && d2 != 0 && d1 != d2
        })
        .count()
}

fn sign(delta: f64) -> i8 {
    if delta > 0.0 {
        1
    } else if delta < 0.0 {
        -1
    } else {
        0
    }
}

/// Flags quality drops and ABR oscillation per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct BitrateDetector;

impl Detector for BitrateDetector {
    fn name(&self) -> &'static str {
        "bitrate"
    }

    fn detect(&self, batch: &[TelemetryEntry], config: &DetectionConfig) -> Vec<Anomaly> {
        let mut out = Vec::new();
        let groups = group_by_session(batch);

        for (sid, entries) in groups.iter() {
            let with_bitrate: Vec<&TelemetryEntry> = entries
                .iter()
                .copied()
                .filter(|e| e.bitrate_kbps.is_some())
                .collect();
            if with_bitrate.len() < MIN_BITRATE_READINGS {
                continue;
            }
            let bitrates: Vec<f64> = with_bitrate.iter().filter_map(|e| e.bitrate_kbps).collect();

            let drops = significant_drops(&bitrates, config.quality_degradation_threshold);
            if !drops.is_empty() {
                let timestamps: Vec<_> = drops.iter().map(|&i| with_bitrate[i].timestamp).collect();
                let severity = if drops.len() > HIGH_SEVERITY_DROPS {
                    Severity::High
                } else {
                    Severity::Medium
                };
                out.push(
                    Anomaly::new(
                        AnomalyType::QualityDegradation,
                        severity,
                        format!("Quality degradation detected in session {sid}"),
                        &["br", "mtp"],
                        json!({
                            "sessionId": sid,
                            "bitrateDrops": drops.len(),
                            "timestamps": timestamps,
                        }),
                    )
                    .with_recommendation(
                        "Check network conditions, CDN performance, or adjust ABR algorithm",
                    ),
                );
            }

            if bitrates.len() > OSCILLATION_MIN_READINGS {
                let reversals = direction_reversals(&bitrates);
                if reversals > OSCILLATION_REVERSALS {
                    out.push(
                        Anomaly::new(
                            AnomalyType::BandwidthFluctuation,
                            Severity::Medium,
                            format!("Bitrate oscillation detected in session {sid}"),
                            &["br", "mtp"],
                            json!({
                                "sessionId": sid,
                                "fluctuations": reversals,
                            }),
                        )
                        .with_recommendation(
                            "Implement bitrate stabilization algorithms or increase buffer safety factor",
                        ),
                    );
                }
            }
        }
        out
    }
}

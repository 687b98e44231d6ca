//! Tests for the ingestion engine: window eviction and swap, delivery classes,
//! the forced path and end-to-end detector scenarios.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use proptest::prelude::*;

use cmcd_qoe_monitor::anomaly::{AnomalyType, Severity};
use cmcd_qoe_monitor::detection::DetectionConfig;
use cmcd_qoe_monitor::ingest::{BroadcastSink, Engine, IngestionBuffer, NullSink, SinkEvent};
use cmcd_qoe_monitor::settings::EngineSettings;
use cmcd_qoe_monitor::telemetry::TelemetryEntry;

fn engine() -> Engine {
    Engine::new(&EngineSettings::default(), DetectionConfig::default(), Arc::new(NullSink), Instant::now())
}

fn entry(sid: &str) -> TelemetryEntry {
    TelemetryEntry::new(Utc::now(), Some(sid.to_string()))
}

fn with_bitrate(sid: &str, br: f64) -> TelemetryEntry {
    let mut e = entry(sid);
    e.bitrate_kbps = Some(br);
    e
}

fn with_throughput(sid: &str, mtp: f64) -> TelemetryEntry {
    let mut e = entry(sid);
    e.measured_throughput_kbps = Some(mtp);
    e
}

// ---------------------------------------------------------------------------
// Rolling window
// ---------------------------------------------------------------------------

#[test]
fn test_101_entries_keep_last_100_in_order() {
    let mut buf = IngestionBuffer::with_defaults(Instant::now());
    let now = Instant::now();
    for i in 0..101 {
        buf.submit_at(entry(&format!("s{i}")), now);
    }
    let ids: Vec<String> = buf.window().iter().map(|e| e.session().to_string()).collect();
    assert_eq!(ids.len(), 100);
    assert_eq!(ids[0], "s1");
    assert_eq!(ids[99], "s100");
}

proptest! {
    #[test]
    fn test_window_never_exceeds_capacity(n in 0usize..400, cap in 1usize..150) {
        let now = Instant::now();
        let mut buf = IngestionBuffer::new(cap, 3, Duration::from_secs(3), now);
        for i in 0..n {
            buf.submit_at(entry(&format!("s{i}")), now);
        }
        prop_assert_eq!(buf.window_len(), n.min(cap));
        let first = buf.window().iter().next().map(|e| e.session().to_string());
        let expected = (n > 0).then(|| format!("s{}", n.saturating_sub(cap)));
        prop_assert_eq!(first, expected);
    }
}

#[test]
fn test_window_swap_evaluates_each_entry_once() {
    let mut eng = engine();
    let now = Instant::now();
    for _ in 0..3 {
        let mut e = entry("s");
        e.buffer_starvation = Some(true);
        eng.submit(e, now);
    }
    assert_eq!(eng.tick(now).len(), 1);
    assert!(eng.tick(now).is_empty());

    let mut late = entry("s");
    late.buffer_starvation = Some(true);
    eng.submit(late, now);
    // a lone entry sits under the sample-size gate
    assert!(eng.tick(now).is_empty());
    assert_eq!(eng.stats().window_len, 0);
}

// ---------------------------------------------------------------------------
// Delivery classes
// ---------------------------------------------------------------------------

#[test]
fn test_forced_startup_delay_simulation() {
    let mut eng = engine();
    let mut e = entry("demo");
    e.is_simulation = true;
    e.force_detection = true;
    e.anomaly_type = Some("STARTUP_DELAY".into());

    let out = eng.submit(e, Instant::now());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].kind, AnomalyType::StartupDelay);
    assert_eq!(out[0].severity, Severity::Medium);
    assert_eq!(out[0].affected_metrics, vec!["dl".to_string(), "su".to_string()]);
    assert_eq!(eng.stats().simulation_pending, 0);
}

#[test]
fn test_simulation_batch_flushes_at_three() {
    let mut eng = engine();
    let now = Instant::now();
    let sim = || {
        let mut e = entry("sim");
        e.is_simulation = true;
        e
    };
    assert!(eng.submit(sim(), now).is_empty());
    assert!(eng.submit(sim(), now).is_empty());
    let out = eng.submit(sim(), now);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].session_id(), Some("sim"));
    assert_eq!(eng.stats().window_len, 0);
}

#[test]
fn test_one_shot_bypasses_gate_and_window() {
    let mut eng = engine();
    let mut e = entry("once");
    e.one_shot = true;
    let out = eng.submit(e, Instant::now());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].kind, AnomalyType::QualityDegradation);
    assert_eq!(out[0].message, "Forced test anomaly for UI verification");
}

#[test]
fn test_sink_sees_sessions_then_anomalies() {
    let sink = Arc::new(BroadcastSink::new(8));
    let mut rx = sink.subscribe();
    let mut eng =
        Engine::new(&EngineSettings::default(), DetectionConfig::default(), sink.clone(), Instant::now());
    let now = Instant::now();
    for mtp in [8000.0, 2000.0, 8000.0] {
        eng.submit(with_throughput("net", mtp), now);
    }
    eng.tick(now);

    assert_eq!(rx.try_recv().unwrap(), SinkEvent::ActiveSessions(vec!["net".into()]));
    match rx.try_recv().unwrap() {
        SinkEvent::Anomalies(a) => assert_eq!(a[0].kind, AnomalyType::NetworkIssue),
        other => panic!("unexpected event {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Detector scenarios through the engine
// ---------------------------------------------------------------------------

#[test]
fn test_bitrate_scenario_single_medium_drop() {
    let mut eng = engine();
    let now = Instant::now();
    for br in [6000.0, 3000.0, 6000.0, 2000.0, 5000.0] {
        eng.submit(with_bitrate("abr", br), now);
    }
    let out = eng.tick(now);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].kind, AnomalyType::QualityDegradation);
    assert_eq!(out[0].severity, Severity::Medium);
    assert!(out.iter().all(|a| a.kind != AnomalyType::BandwidthFluctuation));
}

#[test]
fn test_throughput_swing_is_high_network_issue() {
    let mut eng = engine();
    let now = Instant::now();
    for mtp in [8000.0, 2000.0, 8000.0] {
        eng.submit(with_throughput("net", mtp), now);
    }
    let out = eng.tick(now);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].kind, AnomalyType::NetworkIssue);
    assert_eq!(out[0].severity, Severity::High);
    assert_eq!(out[0].context["fluctuationPercent"], 75.0);
}

#[test]
fn test_detector_order_in_output() {
    let mut eng = engine();
    let now = Instant::now();
    let mut batch = Vec::new();
    for (i, mtp) in [8000.0, 2000.0, 8000.0].into_iter().enumerate() {
        let mut e = with_throughput("mix", mtp);
        e.buffer_starvation = Some(i < 2);
        batch.push(e);
    }
    for e in batch {
        eng.submit(e, now);
    }
    let kinds: Vec<AnomalyType> = eng.tick(now).into_iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![AnomalyType::Buffering, AnomalyType::NetworkIssue]);
}

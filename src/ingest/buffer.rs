//! Rolling window of regular entries and the simulation accumulator.
//!
//! Nothing in here evaluates anything. The buffer classifies each entry,
//! stores it (or not) and tells the engine what, if anything, is now ready
//! for the detector pipeline.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::telemetry::TelemetryEntry;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Entries held in the rolling window before the oldest is evicted.
pub const DEFAULT_WINDOW_CAPACITY: usize = 100;
/// Simulation entries accumulated before a flush is forced.
pub const DEFAULT_SIMULATION_BATCH: usize = 3;
/// A non-empty accumulator older than this is flushed.
pub const DEFAULT_SIMULATION_FLUSH: Duration = Duration::from_millis(3_000);

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// How an incoming entry is routed. The first matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryClass {
    Simulation,
    OneShot,
    Regular,
}

impl EntryClass {
    pub fn of(entry: &TelemetryEntry) -> Self {
        if entry.is_simulation {
            EntryClass::Simulation
        } else if entry.one_shot {
            EntryClass::OneShot
        } else {
            EntryClass::Regular
        }
    }
}

impl std::fmt::Display for EntryClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryClass::Simulation => write!(f, "simulation"),
            EntryClass::OneShot    => write!(f, "one_shot"),
            EntryClass::Regular    => write!(f, "regular"),
        }
    }
}

// ---------------------------------------------------------------------------
// RollingWindow
// ---------------------------------------------------------------------------

/// Bounded FIFO of regular entries awaiting the next periodic evaluation.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    entries: VecDeque<TelemetryEntry>,
    capacity: usize,
}

impl RollingWindow {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity), capacity }
    }

    /// Append, evicting the oldest entry when full. Returns `true` on eviction.
    pub fn push(&mut self, entry: TelemetryEntry) -> bool {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            true
        } else {
            false
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TelemetryEntry> {
        self.entries.iter()
    }

    /// Distinct session ids in first-seen order.
    pub fn active_sessions(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for entry in &self.entries {
            let sid = entry.session();
            if !seen.iter().any(|s| s == sid) {
                seen.push(sid.to_string());
            }
        }
        seen
    }

    /// Move every entry out, leaving the window empty.
    pub fn take(&mut self) -> Vec<TelemetryEntry> {
        std::mem::take(&mut self.entries).into()
    }
}

// ---------------------------------------------------------------------------
// SimulationAccumulator
// ---------------------------------------------------------------------------

/// Short-lived batch of simulation entries.
#[derive(Debug, Clone)]
pub struct SimulationAccumulator {
    entries: Vec<TelemetryEntry>,
    batch_size: usize,
    flush_after: Duration,
    last_flush: Instant,
}

impl SimulationAccumulator {
    pub fn new(batch_size: usize, flush_after: Duration, now: Instant) -> Self {
        Self {
            entries: Vec::new(),
            batch_size: batch_size.max(1),
            flush_after,
            last_flush: now,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_stale(&self, now: Instant) -> bool {
        !self.entries.is_empty() && now.saturating_duration_since(self.last_flush) > self.flush_after
    }

    /// Add an entry and return the batch to flush if the emit decision fires.
    pub fn push(&mut self, entry: TelemetryEntry, now: Instant) -> Option<Vec<TelemetryEntry>> {
        let forced = entry.force_detection;
        self.entries.push(entry);
        if forced || self.entries.len() >= self.batch_size || self.is_stale(now) {
            Some(self.flush(now))
        } else {
            None
        }
    }

    /// Flush only if the accumulator has been waiting longer than the bound.
    pub fn take_if_stale(&mut self, now: Instant) -> Option<Vec<TelemetryEntry>> {
        self.is_stale(now).then(|| self.flush(now))
    }

    fn flush(&mut self, now: Instant) -> Vec<TelemetryEntry> {
        self.last_flush = now;
        std::mem::take(&mut self.entries)
    }
}

// ---------------------------------------------------------------------------
// IngestionBuffer
// ---------------------------------------------------------------------------

/// What happened to one submitted entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    /// Stored in the rolling window; `evicted` is set if the oldest entry was dropped.
    Windowed { evicted: bool },
    /// Held in the simulation accumulator.
    Accumulated,
    /// The accumulator fired; evaluate this batch as forced.
    SimulationFlush(Vec<TelemetryEntry>),
    /// Evaluate this entry on its own as forced.
    OneShot(TelemetryEntry),
}

/// Single entry point for telemetry.
#[derive(Debug, Clone)]
pub struct IngestionBuffer {
    window: RollingWindow,
    simulation: SimulationAccumulator,
}

impl IngestionBuffer {
    pub fn new(
        window_capacity: usize,
        simulation_batch: usize,
        simulation_flush: Duration,
        now: Instant,
    ) -> Self {
        Self {
            window: RollingWindow::new(window_capacity),
            simulation: SimulationAccumulator::new(simulation_batch, simulation_flush, now),
        }
    }

    pub fn with_defaults(now: Instant) -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY, DEFAULT_SIMULATION_BATCH, DEFAULT_SIMULATION_FLUSH, now)
    }

    /// Classify and store `entry`.
    pub fn submit_at(&mut self, entry: TelemetryEntry, now: Instant) -> Ingested {
        let class = EntryClass::of(&entry);
        debug!(class = %class, session = entry.session(), "entry received");

        match class {
            EntryClass::Simulation => match self.simulation.push(entry, now) {
                Some(batch) => Ingested::SimulationFlush(batch),
                None => Ingested::Accumulated,
            },
            EntryClass::OneShot => Ingested::OneShot(entry),
            EntryClass::Regular => Ingested::Windowed { evicted: self.window.push(entry) },
        }
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn pending_simulation(&self) -> usize {
        self.simulation.len()
    }

    /// Swap the window out for an empty one and return what it held,
    /// together with its active sessions.
    pub fn take_window(&mut self) -> Option<(Vec<String>, Vec<TelemetryEntry>)> {
        if self.window.is_empty() {
            return None;
        }
        let sessions = self.window.active_sessions();
        Some((sessions, self.window.take()))
    }

    pub fn take_stale_simulation(&mut self, now: Instant) -> Option<Vec<TelemetryEntry>> {
        self.simulation.take_if_stale(now)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

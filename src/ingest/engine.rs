//! # Stage: Detection Engine
//!
//! ## Responsibility
//! Owns the ingestion buffer, the live detection config, the detector
//! pipeline and the sink. Decides when to evaluate and forwards the results.
//!
//! ## Guarantees
//! - Single writer: [`Engine::spawn`] moves the engine into one task, so
//!   submit, tick, manual evaluation and config updates never interleave
//! - Every regular entry is part of at most one evaluation batch
//! - A panicking detector loses that batch only; the next cycle runs normally
//! - Non-blocking: evaluation is pure computation over buffered data
//!
//! ## NOT Responsible For
//! - Parsing or validating wire payloads (that is the transport)
//! - Delivering events to clients (that is the sink)

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::buffer::{Ingested, IngestionBuffer};
use super::sink::AnomalySink;
use crate::anomaly::Anomaly;
use crate::detection::forced::fallback_anomaly;
use crate::detection::{ConfigStore, DetectionConfig, DetectionConfigPatch, DetectorPipeline};
use crate::error::{MonitorError, Result};
use crate::settings::EngineSettings;
use crate::telemetry::{TelemetryEntry, UNKNOWN_SESSION};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Counters since the engine started, plus current buffer occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub entries_received: u64,
    pub regular_entries: u64,
    pub simulation_entries: u64,
    pub one_shot_entries: u64,
    pub evicted_entries: u64,
    pub evaluation_cycles: u64,
    pub anomalies_emitted: u64,
    pub failed_evaluations: u64,
    pub window_len: usize,
    pub simulation_pending: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Synchronous engine state. Every time-dependent operation takes `now`.
pub struct Engine {
    buffer: IngestionBuffer,
    config: ConfigStore,
    pipeline: DetectorPipeline,
    sink: Arc<dyn AnomalySink>,
    stats: EngineStats,
    tick_interval: Duration,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("pipeline", &self.pipeline)
            .field("config", &self.config.snapshot())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        settings: &EngineSettings,
        detection: DetectionConfig,
        sink: Arc<dyn AnomalySink>,
        now: Instant,
    ) -> Self {
        Self {
            buffer: IngestionBuffer::new(
                settings.window_capacity,
                settings.simulation_batch_size,
                settings.simulation_flush(),
                now,
            ),
            config: ConfigStore::new(detection),
            pipeline: DetectorPipeline::standard(),
            sink,
            stats: EngineStats::default(),
            tick_interval: settings.tick_interval(),
        }
    }

    /// Replace the detector set.
    pub fn with_pipeline(mut self, pipeline: DetectorPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Accept one entry. Returns whatever was emitted as a direct consequence.
    pub fn submit(&mut self, entry: TelemetryEntry, now: Instant) -> Vec<Anomaly> {
        self.stats.entries_received += 1;

        match self.buffer.submit_at(entry, now) {
            Ingested::Windowed { evicted } => {
                self.stats.regular_entries += 1;
                if evicted {
                    self.stats.evicted_entries += 1;
                }
                Vec::new()
            }
            Ingested::Accumulated => {
                self.stats.simulation_entries += 1;
                Vec::new()
            }
            Ingested::SimulationFlush(batch) => {
                self.stats.simulation_entries += 1;
                self.flush_simulation(&batch)
            }
            Ingested::OneShot(entry) => {
                self.stats.one_shot_entries += 1;
                let anomalies = self.run_pipeline(std::slice::from_ref(&entry), true).unwrap_or_default();
                self.emit(anomalies)
            }
        }
    }

    /// Periodic evaluation: the rolling window, then a stale simulation batch.
    pub fn tick(&mut self, now: Instant) -> Vec<Anomaly> {
        let mut emitted = Vec::new();

        if let Some((sessions, batch)) = self.buffer.take_window() {
            self.sink.on_active_sessions(&sessions);
            debug!(batch = batch.len(), sessions = sessions.len(), "evaluating rolling window");
            let anomalies = self.run_pipeline(&batch, false).unwrap_or_default();
            emitted.extend(self.emit(anomalies));
        }

        if let Some(batch) = self.buffer.take_stale_simulation(now) {
            debug!(batch = batch.len(), "flushing stale simulation batch");
            emitted.extend(self.flush_simulation(&batch));
        }

        emitted
    }

    /// Manual trigger; identical to a tick.
    pub fn evaluate_now(&mut self, now: Instant) -> Vec<Anomaly> {
        self.tick(now)
    }

    pub fn config(&self) -> Arc<DetectionConfig> {
        self.config.snapshot()
    }

    pub fn update_config(&mut self, patch: &DetectionConfigPatch) -> Arc<DetectionConfig> {
        self.config.merge(patch)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            window_len: self.buffer.window_len(),
            simulation_pending: self.buffer.pending_simulation(),
            ..self.stats.clone()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    // --- internal ---

    fn flush_simulation(&mut self, batch: &[TelemetryEntry]) -> Vec<Anomaly> {
        let Some(mut anomalies) = self.run_pipeline(batch, true) else {
            return Vec::new();
        };
        if anomalies.is_empty() {
            let session = batch.last().map_or(UNKNOWN_SESSION, TelemetryEntry::session);
            anomalies.push(fallback_anomaly(session));
        }
        self.emit(anomalies)
    }

    /// `None` if the pipeline panicked.
    fn run_pipeline(&mut self, batch: &[TelemetryEntry], force: bool) -> Option<Vec<Anomaly>> {
        self.stats.evaluation_cycles += 1;
        let config = self.config.snapshot();
        let pipeline = &self.pipeline;

        match catch_unwind(AssertUnwindSafe(|| pipeline.evaluate(batch, &config, force))) {
            Ok(anomalies) => Some(anomalies),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                self.stats.failed_evaluations += 1;
                error!(batch = batch.len(), reason = %reason, "evaluation failed, batch dropped");
                None
            }
        }
    }

    fn emit(&mut self, anomalies: Vec<Anomaly>) -> Vec<Anomaly> {
        if !anomalies.is_empty() {
            self.stats.anomalies_emitted += anomalies.len() as u64;
            self.sink.on_anomalies(&anomalies);
        }
        anomalies
    }

    /// Move the engine into its own task and return a handle to it.
    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (EngineHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;

        info!(tick_ms = self.tick_interval.as_millis() as u64, "detection engine started");

        loop {
            tokio::select! {
                biased;
                cmd = rx.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                _ = ticker.tick() => {
                    self.tick(tokio::time::Instant::now().into_std());
                }
            }
        }

        info!(stats = ?self.stats(), "detection engine stopped");
    }

    fn handle(&mut self, cmd: Command) {
        let now = tokio::time::Instant::now().into_std();
        match cmd {
            Command::Submit(entry) => {
                self.submit(*entry, now);
            }
            Command::Evaluate(reply) => {
                let _ = reply.send(self.evaluate_now(now));
            }
            Command::GetConfig(reply) => {
                let _ = reply.send(self.config());
            }
            Command::UpdateConfig(patch, reply) => {
                let _ = reply.send(self.update_config(&patch));
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

enum Command {
    Submit(Box<TelemetryEntry>),
    Evaluate(oneshot::Sender<Vec<Anomaly>>),
    GetConfig(oneshot::Sender<Arc<DetectionConfig>>),
    UpdateConfig(DetectionConfigPatch, oneshot::Sender<Arc<DetectionConfig>>),
    Stats(oneshot::Sender<EngineStats>),
    Shutdown,
}

/// Cloneable handle to a spawned [`Engine`].
///
/// Commands are applied in the order they are sent. Once the engine task has
/// stopped every call returns [`MonitorError::EngineStopped`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    fn send(&self, cmd: Command) -> Result<()> {
        self.tx.send(cmd).map_err(|_| MonitorError::EngineStopped)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| MonitorError::EngineStopped)
    }

    pub async fn submit(&self, entry: TelemetryEntry) -> Result<()> {
        self.send(Command::Submit(Box::new(entry)))
    }

    /// Evaluate the rolling window now and return what was emitted.
    pub async fn evaluate_now(&self) -> Result<Vec<Anomaly>> {
        self.request(Command::Evaluate).await
    }

    pub async fn config(&self) -> Result<Arc<DetectionConfig>> {
        self.request(Command::GetConfig).await
    }

    pub async fn update_config(&self, patch: DetectionConfigPatch) -> Result<Arc<DetectionConfig>> {
        self.request(|reply| Command::UpdateConfig(patch, reply)).await
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        self.request(Command::Stats).await
    }

    /// Stop the timer and the task. Commands already queued ahead of this one still run.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

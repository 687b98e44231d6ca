//! # cmcd-qoe-monitor
//!
//! Ingests Common Media Client Data (CMCD) telemetry from video players,
//! buffers it per delivery class and runs threshold detectors over it to
//! surface playback problems: buffering, bitrate oscillation, slow startup and
//! network trouble.
//!
//! ## Layout
//! - [`telemetry`]: the CMCD entry as received on the wire
//! - [`anomaly`]: what detectors emit
//! - [`detection`]: config, detectors and the pipeline that runs them
//! - [`ingest`]: buffering, the engine actor and the emission sink
//! - [`web`]: HTTP ingestion and WebSocket push
//! - [`generator`]: synthetic traffic for demos
//! - [`settings`], [`cli`], [`logger`], [`error`]: process plumbing

pub mod anomaly;
pub mod cli;
pub mod detection;
pub mod error;
pub mod generator;
pub mod ingest;
pub mod logger;
pub mod settings;
pub mod telemetry;
pub mod web;

pub use anomaly::{Anomaly, AnomalyType, Severity};
pub use detection::{DetectionConfig, DetectionConfigPatch, Detector, DetectorPipeline};
pub use error::{MonitorError, Result};
pub use ingest::{AnomalySink, BroadcastSink, Engine, EngineHandle, EngineStats, SinkEvent};
pub use settings::Settings;
pub use telemetry::TelemetryEntry;

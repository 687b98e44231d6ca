//! # Module: ingest
//!
//! The stateful half of the monitor.
//!
//! - [`buffer`]: classification, the rolling window and the simulation accumulator
//! - [`engine`]: the single-writer engine, its actor task and the handle to it
//! - [`sink`]: where emitted anomalies and active-session lists go

pub mod buffer;
pub mod engine;
pub mod sink;

pub use buffer::{EntryClass, Ingested, IngestionBuffer, RollingWindow};
pub use engine::{Engine, EngineHandle, EngineStats};
pub use sink::{AnomalySink, BroadcastSink, NullSink, SinkEvent, SINK_CHANNEL_CAP};

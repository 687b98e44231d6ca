//! # Module: detection
//!
//! Deterministic threshold rules over a batch of CMCD entries.
//!
//! ## Sub-modules
//! - [`config`]: thresholds and the partial-update patch
//! - [`grouping`]: session partitioning shared by every detector
//! - [`buffering`], [`bitrate`], [`startup`], [`network`]: the four rule sets
//! - [`forced`]: the deterministic override used by demo and test traffic
//! - [`pipeline`]: runs the above in a fixed order behind the sample-size gate
//!
//! ## NOT Responsible For
//! - Deciding *when* to evaluate (that is the ingestion buffer)
//! - Delivering results (that is the emission sink)

pub mod config;
pub mod grouping;
pub mod buffering;
pub mod bitrate;
pub mod startup;
pub mod network;
pub mod forced;
pub mod pipeline;

pub use config::{ConfigStore, DetectionConfig, DetectionConfigPatch};
pub use grouping::{group_by_session, SessionGroups};
pub use pipeline::DetectorPipeline;

use crate::anomaly::Anomaly;
use crate::telemetry::TelemetryEntry;

/// One independent rule set.
///
/// A detector sees the whole batch and does its own session grouping. It must
/// not depend on the output of any other detector.
pub trait Detector: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Evaluate `batch` against `config`. Output order follows session
    /// first-seen order within the batch.
    fn detect(&self, batch: &[TelemetryEntry], config: &DetectionConfig) -> Vec<Anomaly>;
}

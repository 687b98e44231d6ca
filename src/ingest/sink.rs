//! Where evaluation results go.
//!
//! Emission is fire-and-forget: the engine calls the sink and moves on. A sink
//! never reports failure back.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::anomaly::Anomaly;

/// Capacity of the broadcast channel behind [`BroadcastSink`].
pub const SINK_CHANNEL_CAP: usize = 256;

/// Receives evaluation output from the engine.
pub trait AnomalySink: Send + Sync {
    /// Called once per evaluation cycle that produced at least one anomaly.
    fn on_anomalies(&self, anomalies: &[Anomaly]);

    /// Called before each periodic evaluation of a non-empty rolling window.
    fn on_active_sessions(&self, sessions: &[String]);
}

/// One pushed event, as seen by WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum SinkEvent {
    Anomalies(Vec<Anomaly>),
    ActiveSessions(Vec<String>),
}

/// Fans events out to every live subscriber.
///
/// Sending with no subscribers is fine; slow subscribers lag and lose the
/// oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<SinkEvent>,
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(SINK_CHANNEL_CAP)
    }
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn publish(&self, event: SinkEvent) {
        if self.tx.send(event).is_err() {
            trace!("no subscribers for sink event");
        }
    }
}

impl AnomalySink for BroadcastSink {
    fn on_anomalies(&self, anomalies: &[Anomaly]) {
        self.publish(SinkEvent::Anomalies(anomalies.to_vec()));
    }

    fn on_active_sessions(&self, sessions: &[String]) {
        self.publish(SinkEvent::ActiveSessions(sessions.to_vec()));
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AnomalySink for NullSink {
    fn on_anomalies(&self, _: &[Anomaly]) {}
    fn on_active_sessions(&self, _: &[String]) {}
}

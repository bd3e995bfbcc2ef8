//! Fan-out of supervisor events to connected observers
//!
//! Each observer owns a bounded channel. Publishing never blocks: an observer
//! whose channel is closed or full is dropped from the registry.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::types::AggregateState;

/// Per-observer queue depth
pub const OBSERVER_CHANNEL_BOUND: usize = 256;

/// An event delivered to observers
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// Full aggregate after a mutation
    State(AggregateState),
    /// One line of process output (or supervisor narration) for a port
    Log { port: u16, line: String },
}

#[derive(Serialize)]
struct LogPayload<'a> {
    port: String,
    line: &'a str,
}

impl BusEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            BusEvent::State(_) => "state",
            BusEvent::Log { .. } => "log",
        }
    }

    /// JSON payload. Log ports are encoded as strings.
    pub fn to_json(&self) -> Result<String, String> {
        let result = match self {
            BusEvent::State(state) => serde_json::to_string(state),
            BusEvent::Log { port, line } => serde_json::to_string(&LogPayload {
                port: port.to_string(),
                line,
            }),
        };
        result.map_err(|e| format!("Failed to serialize {} event: {}", self.name(), e))
    }
}

/// Registry of observer channels.
///
/// Not internally synchronized: the supervisor owns it behind its own lock so
/// publish order matches mutation order.
#[derive(Default)]
pub struct EventBus {
    senders: Vec<mpsc::Sender<BusEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. `initial` is queued before any later event.
    pub fn subscribe(&mut self, initial: BusEvent) -> mpsc::Receiver<BusEvent> {
        let (tx, rx) = mpsc::channel(OBSERVER_CHANNEL_BOUND);
        if tx.try_send(initial).is_ok() {
            self.senders.push(tx);
        }
        rx
    }

    pub fn publish(&mut self, event: BusEvent) {
        self.senders.retain(|tx| tx.try_send(event.clone()).is_ok());
    }

    /// Drop every observer; their streams end once drained
    pub fn close_all(&mut self) {
        self.senders.clear();
    }

    pub fn observer_count(&self) -> usize {
        self.senders.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

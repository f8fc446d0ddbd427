//! Ability lifecycle events and the sinks that receive them.

use crate::host::contract::EventEnvelope;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lifecycle event kinds emitted by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbilityEventKind {
    #[serde(rename = "ability.started")]
    Started,
    #[serde(rename = "ability.stopped")]
    Stopped,
    #[serde(rename = "ability.crashed")]
    Crashed,
}

impl AbilityEventKind {
    /// Render event name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "ability.started",
            Self::Stopped => "ability.stopped",
            Self::Crashed => "ability.crashed",
        }
    }

    /// Parse an event name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ability.started" => Some(Self::Started),
            "ability.stopped" => Some(Self::Stopped),
            "ability.crashed" => Some(Self::Crashed),
            _ => None,
        }
    }

    /// Whether this event ends an on/off cycle.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Crashed)
    }
}

/// A single lifecycle event for one ability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbilityEvent {
    pub kind: AbilityEventKind,
    pub name: String,
    /// Error returned by a crashed Runnable, if any.
    pub error: Option<String>,
}

impl AbilityEvent {
    #[must_use]
    pub fn new(kind: AbilityEventKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            error: None,
        }
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Event payload: `{"name": ...}`, plus `"error"` when one was captured.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({ "name": self.name });
        if let Some(error) = &self.error {
            payload["error"] = serde_json::Value::String(error.clone());
        }
        payload
    }

    pub fn emit(&self, sink: &dyn EventSink) {
        sink.send(self.kind.as_str(), self.payload());
    }
}

/// Receives named events with a JSON payload.
///
/// Called from the caller's thread during `on()` and from supervisor tasks,
/// so implementations must return promptly.
pub trait EventSink: Send + Sync + 'static {
    fn send(&self, event: &str, payload: serde_json::Value);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn send(&self, _event: &str, _payload: serde_json::Value) {}
}

/// Publishes events as [`EventEnvelope`]s on a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<EventEnvelope>,
}

impl BroadcastEventSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn send(&self, event: &str, payload: serde_json::Value) {
        let envelope = EventEnvelope::new(uuid::Uuid::new_v4().to_string(), event, payload);
        // No subscribers is not an error.
        let _ = self.tx.send(envelope);
    }
}

//! Progress side-channel.
//!
//! Every notable pipeline transition emits `(event_name, payload)`. Sinks are
//! fire-and-forget: they return nothing and must swallow their own failures.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Receives progress events. Implementations must never panic back into the pipeline.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &str, payload: &Value);
}

/// A recorded progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event: String,
    pub payload: Value,
    pub at: DateTime<Utc>,
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: &str, payload: &Value) {
        if event.ends_with(":error") || event.ends_with("_error") {
            tracing::warn!(event, %payload, "progress");
        } else {
            tracing::info!(event, %payload, "progress");
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event).collect()
    }

    /// Events whose name equals `event`.
    pub fn find(&self, event: &str) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event == event)
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: &str, payload: &Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(ProgressEvent {
                event: event.to_string(),
                payload: payload.clone(),
                at: Utc::now(),
            });
        }
    }
}

/// Sends each event to several sinks.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }
}

impl ProgressSink for FanoutSink {
    fn emit(&self, event: &str, payload: &Value) {
        for sink in &self.sinks {
            sink.emit(event, payload);
        }
    }
}

/// Cheap, cloneable handle the pipeline components emit through.
#[derive(Clone)]
pub struct Progress {
    sink: Arc<dyn ProgressSink>,
}

impl Progress {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink }
    }

    /// A handle that only logs.
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    pub fn emit(&self, event: &str, payload: Value) {
        self.sink.emit(event, &payload);
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::tracing()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}

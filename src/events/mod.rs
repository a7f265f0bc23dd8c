//! Event log sink: the core emits structured events but never persists or
//! blocks on them. Persistence is an external collaborator's job.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ManifestBuilt,
    Copy,
    CopyError,
    Skip,
    Verify,
    VerifyMismatch,
    SessionStart,
    SessionComplete,
    Cancellation,
}

impl EventType {
    /// Collapse onto the five-value category a wire consumer sees:
    /// `copy`/`verify`/`skip`/`error`/`cancel`. The variant itself stays
    /// fine-grained for in-process sinks; this is only for callers that need
    /// the closed set.
    pub fn wire_category(&self) -> &'static str {
        match self {
            EventType::Copy | EventType::ManifestBuilt | EventType::SessionStart
            | EventType::SessionComplete => "copy",
            EventType::CopyError | EventType::VerifyMismatch => "error",
            EventType::Skip => "skip",
            EventType::Verify => "verify",
            EventType::Cancellation => "cancel",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub session_id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: EventType,
    pub severity: Severity,
    pub source_path: Option<String>,
    pub destination_path: Option<String>,
    pub file_size: Option<u64>,
    pub checksum: Option<String>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl Event {
    pub fn new(session_id: Uuid, event_type: EventType, severity: Severity) -> Self {
        Self {
            session_id,
            timestamp: chrono::Utc::now(),
            event_type,
            severity,
            source_path: None,
            destination_path: None,
            file_size: None,
            checksum: None,
            duration_ms: None,
            error: None,
            metadata: HashMap::new(),
        }
    }
}

/// Write-only sink the core holds but never blocks on. `emit` takes `&self`
/// so a sink can use interior mutability however it likes; implementations
/// own their own concurrency.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Drops every event. The default when no caller supplies a sink.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: Event) {}
}

/// Bounded ring buffer sink for tests and callers who want to inspect
/// events without standing up real persistence.
pub struct InMemorySink {
    capacity: usize,
    events: Mutex<VecDeque<Event>>,
}

impl InMemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for InMemorySink {
    fn emit(&self, event: Event) {
        let mut events = self.events.lock().unwrap();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

//! Structured log events.
//!
//! The runtime writes events to stderr, one per line, behind a fixed prefix
//! so the host can tell them apart from ordinary diagnostics. Stdout stays
//! free for program output and the debugger handshake.

use std::io::Write;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::warn;

use crate::types::LogEvent;

pub const EVENT_PREFIX: &str = "robotflow-event:";

pub trait EventSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

pub fn encode_event(event: &LogEvent) -> Option<String> {
    serde_json::to_string(event)
        .ok()
        .map(|json| format!("{}{}", EVENT_PREFIX, json))
}

/// Parse a prefixed event line; `None` for anything else.
pub fn decode_event(line: &str) -> Option<LogEvent> {
    let json = line.trim_end().strip_prefix(EVENT_PREFIX)?;
    serde_json::from_str(json).ok()
}

/// Writes encoded events to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl EventSink for StderrSink {
    fn emit(&self, event: LogEvent) {
        let Some(line) = encode_event(&event) else {
            warn!(message = %event.message, "dropping unserializable event");
            return;
        };
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        let _ = writeln!(handle, "{}", line);
        let _ = handle.flush();
    }
}

/// Keeps events in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: LogEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Forwards events into a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink(pub mpsc::UnboundedSender<LogEvent>);

impl EventSink for ChannelSink {
    fn emit(&self, event: LogEvent) {
        let _ = self.0.send(event);
    }
}

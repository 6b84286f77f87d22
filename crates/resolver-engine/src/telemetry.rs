//! Telemetry sinks.
//!
//! A sink is constructed by the caller and handed to each component; there is
//! no process-wide client. [`TracingSink`] forwards events to the `tracing`
//! subscriber, [`MemorySink`] keeps them for assertions.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// A named event with string properties.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub name: &'static str,
    pub properties: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Start an event stamped with the current time.
    ///
    /// # Examples
    ///
    /// ```
    /// use resolver_engine::telemetry::TelemetryEvent;
    ///
    /// let event = TelemetryEvent::new("change_applied").with("path", "src/lib.rs");
    /// assert_eq!(event.properties["path"], "src/lib.rs");
    /// ```
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            properties: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }
}

/// Destination for telemetry events.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Emits each event as a structured `tracing` event on the `telemetry` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, event: TelemetryEvent) {
        let properties = serde_json::to_string(&event.properties).unwrap_or_default();
        tracing::info!(
            target: "telemetry",
            event = event.name,
            timestamp = %event.timestamp.to_rfc3339(),
            properties = %properties,
            "telemetry event"
        );
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Names of recorded events, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.name).collect()
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, event: TelemetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

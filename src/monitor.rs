//! Monitoring collaborator contract
//!
//! The cache reports flush and cleanup events through [`MonitorSink`] and
//! never depends on monitoring being available: the contract is
//! fire-and-forget and implementations must swallow their own failures.

use serde_json::Value;
use tracing::info;

/// Fire-and-forget event sink
pub trait MonitorSink: Send + Sync {
    /// Record a named event with a JSON payload
    fn log_event(&self, name: &str, data: Value);
}

/// Sink that forwards events to the `tracing` pipeline
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl MonitorSink for TracingMonitor {
    fn log_event(&self, name: &str, data: Value) {
        info!(target: "trousseau::events", event = name, %data);
    }
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl MonitorSink for NullMonitor {
    fn log_event(&self, _name: &str, _data: Value) {}
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Test sink capturing events in order
    #[derive(Default)]
    pub struct CapturingMonitor {
        pub events: Mutex<Vec<(String, Value)>>,
    }

    impl MonitorSink for CapturingMonitor {
        fn log_event(&self, name: &str, data: Value) {
            self.events.lock().push((name.to_string(), data));
        }
    }

    #[test]
    fn test_capturing_sink_records_in_order() {
        let sink = CapturingMonitor::default();
        sink.log_event("first", json!({"n": 1}));
        sink.log_event("second", json!({"n": 2}));

        let events = sink.events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, "first");
        assert_eq!(events[1].1, json!({"n": 2}));
    }

    #[test]
    fn test_null_sink_accepts_anything() {
        let sink = NullMonitor;
        sink.log_event("ignored", json!({"huge": vec![0; 100]}));
    }
}

//! Monitor configuration.

use serde::{Deserialize, Serialize};
use txwatch_types::TraceCapture;

/// Default number of completed scopes retained per connection.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Per-source monitoring settings, shared by every connection it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Completed scopes kept in each connection's history ring.
    pub history_capacity: usize,
    /// How much calling context to capture at scope begin and completion.
    pub trace_capture: TraceCapture,
}

impl MonitorConfig {
    #[must_use]
    pub const fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_trace_capture(mut self, mode: TraceCapture) -> Self {
        self.trace_capture = mode;
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            trace_capture: TraceCapture::Location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.trace_capture, TraceCapture::Location);
    }

    #[test]
    fn builders_override() {
        let config = MonitorConfig::default()
            .with_history_capacity(3)
            .with_trace_capture(TraceCapture::Backtrace);
        assert_eq!(config.history_capacity, 3);
        assert_eq!(config.trace_capture, TraceCapture::Backtrace);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let text = r#"{"trace_capture":"backtrace"}"#;
        let config: MonitorConfig = serde_json::from_str(text).unwrap();
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(config.trace_capture, TraceCapture::Backtrace);

        let json = serde_json::to_string(&MonitorConfig::default()).unwrap();
        assert_eq!(json, r#"{"history_capacity":10,"trace_capture":"location"}"#);
    }
}

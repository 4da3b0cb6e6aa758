//! Control-channel protocol between the supervisor and its workers.
//!
//! Messages are JSON-serialized and newline-delimited.

use serde::{Deserialize, Serialize};

/// Broadcast from the supervisor to every live worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Reinitialize the render engine from the current bundle location.
    Reload,

    /// Exit the process immediately with status 0.
    Shutdown,

    /// Record an error for display by the no-application page.
    Error {
        /// Error text
        detail: String,
    },
}

/// Sent upstream by a worker. The only variant is the boot handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum WorkerSignal {
    /// Listener bound and serving.
    #[serde(rename = "http-online")]
    HttpOnline,
}

impl ControlMessage {
    /// Create an error message.
    pub fn error(detail: impl Into<String>) -> Self {
        Self::Error {
            detail: detail.into(),
        }
    }

    /// Short name used in logs.
    pub fn event(&self) -> &'static str {
        match self {
            Self::Reload => "reload",
            Self::Shutdown => "shutdown",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> String {
        let mut json = serde_json::to_string(self).expect("ControlMessage serialization failed");
        json.push('\n');
        json
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

impl WorkerSignal {
    /// Serialize to JSON line (with newline).
    pub fn to_line(&self) -> String {
        let mut json = serde_json::to_string(self).expect("WorkerSignal serialization failed");
        json.push('\n');
        json
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(ControlMessage::Reload.to_line(), "{\"event\":\"reload\"}\n");
        assert_eq!(
            ControlMessage::Shutdown.to_line(),
            "{\"event\":\"shutdown\"}\n"
        );
        assert_eq!(
            ControlMessage::error("boom").to_line(),
            "{\"event\":\"error\",\"detail\":\"boom\"}\n"
        );
        assert_eq!(
            WorkerSignal::HttpOnline.to_line(),
            "{\"event\":\"http-online\"}\n"
        );
    }

    #[test]
    fn test_parse_with_whitespace() {
        let msg = ControlMessage::from_line("  {\"event\":\"error\",\"detail\":\"x\"}\r\n").unwrap();
        assert_eq!(msg, ControlMessage::error("x"));
        assert_eq!(msg.event(), "error");
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        assert!(ControlMessage::from_line("{\"event\":\"restart\"}").is_err());
        assert!(WorkerSignal::from_line("{\"event\":\"ready\"}").is_err());
    }
}

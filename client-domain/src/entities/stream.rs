// Streaming channel messages and the consumer-facing event union

use serde::{Deserialize, Serialize};

use crate::entities::Finding;

/// Wire frame delivered by the streaming channel for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    Finding {
        payload: Finding,
    },
    Progress {
        value: u8,
        #[serde(default)]
        message: Option<String>,
    },
    Complete,
    Error {
        message: String,
    },
}

/// Everything a session consumer can observe, as one tagged union instead
/// of six separate callbacks. Connected/Disconnected are transport-level
/// notifications and never carry scan data.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Finding(Finding),
    Progress { percent: u8, message: Option<String> },
    Complete,
    Error { message: String },
    Connected,
    Disconnected,
}

impl From<StreamMessage> for ScanEvent {
    fn from(message: StreamMessage) -> Self {
        match message {
            StreamMessage::Finding { payload } => ScanEvent::Finding(payload),
            StreamMessage::Progress { value, message } => ScanEvent::Progress {
                percent: value.min(100),
                message,
            },
            StreamMessage::Complete => ScanEvent::Complete,
            StreamMessage::Error { message } => ScanEvent::Error { message },
        }
    }
}

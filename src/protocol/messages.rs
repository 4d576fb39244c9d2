use serde::Deserialize;
use std::fmt;

use crate::models::{InferenceResult, WindowMode};

/// Server → client frame, discriminated by its `type` field. Each variant
/// carries only the fields that kind of message defines.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Inference(InferenceMessage),
    DepthData(DepthDataMessage),
    SessionComplete(SessionEventMessage),
    SessionReset(SessionEventMessage),
    ModeChange(ModeChangeMessage),
    /// Any `type` this client does not know yet.
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InferenceMessage {
    pub class_index: u32,
    pub class_label: String,
    pub probs: Vec<f64>,
}

impl From<InferenceMessage> for InferenceResult {
    fn from(message: InferenceMessage) -> Self {
        InferenceResult {
            class_index: message.class_index,
            class_label: message.class_label,
            probs: message.probs,
        }
    }
}

/// One raw reading as it entered the backend's buffer.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DepthDataMessage {
    pub depth_cm: f64,
    #[serde(default)]
    pub timestamp: f64,
    /// Backend buffer occupancy after this reading was appended.
    pub buffer_len: u32,
    /// Backend history length; informational only.
    #[serde(default)]
    pub total_compressions: Option<u32>,
}

/// Payload shared by `session_complete` and `session_reset`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SessionEventMessage {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub total_compressions: Option<u32>,
    #[serde(default)]
    pub total_compressions_before_reset: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModeChangeMessage {
    #[serde(default)]
    pub old_mode: Option<WindowMode>,
    pub new_mode: WindowMode,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Inference,
    DepthData,
    SessionComplete,
    SessionReset,
    ModeChange,
    Unrecognized,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Inference => "inference",
            MessageKind::DepthData => "depth_data",
            MessageKind::SessionComplete => "session_complete",
            MessageKind::SessionReset => "session_reset",
            MessageKind::ModeChange => "mode_change",
            MessageKind::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::Inference(_) => MessageKind::Inference,
            ServerMessage::DepthData(_) => MessageKind::DepthData,
            ServerMessage::SessionComplete(_) => MessageKind::SessionComplete,
            ServerMessage::SessionReset(_) => MessageKind::SessionReset,
            ServerMessage::ModeChange(_) => MessageKind::ModeChange,
            ServerMessage::Unrecognized => MessageKind::Unrecognized,
        }
    }

    /// One-line description for the diagnostics log.
    pub fn summary(&self) -> String {
        match self {
            ServerMessage::Inference(m) => {
                let confidence = m
                    .probs
                    .get(m.class_index as usize)
                    .map(|p| format!("{:.1}%", p * 100.0))
                    .unwrap_or_else(|| "n/a".into());
                format!("{} ({}) - {}", m.class_label, m.class_index, confidence)
            }
            ServerMessage::DepthData(m) => {
                format!("depth {:.2} cm, buffer {}", m.depth_cm, m.buffer_len)
            }
            ServerMessage::SessionComplete(m) | ServerMessage::SessionReset(m) => {
                m.message.clone().unwrap_or_default()
            }
            ServerMessage::ModeChange(m) => match m.old_mode {
                Some(old) => format!("{old} -> {}", m.new_mode),
                None => format!("-> {}", m.new_mode),
            },
            ServerMessage::Unrecognized => String::new(),
        }
    }
}

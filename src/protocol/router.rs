use crate::error::MonitorError;
use crate::models::CLASS_COUNT;

use super::messages::{
    DepthDataMessage, InferenceMessage, MessageKind, ModeChangeMessage, ServerMessage,
    SessionEventMessage,
};

/// Follow-up work a handler asks the caller to schedule after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    None,
    /// Re-read the depth history from the backend.
    RefreshHistory,
}

/// Receiver for routed messages. Exactly one method runs per recognized frame.
pub trait MessageHandler {
    fn on_inference(&mut self, message: InferenceMessage) -> Reaction;
    fn on_depth_data(&mut self, message: DepthDataMessage) -> Reaction;
    fn on_session_complete(&mut self, message: SessionEventMessage) -> Reaction;
    fn on_session_reset(&mut self, message: SessionEventMessage) -> Reaction;
    fn on_mode_change(&mut self, message: ModeChangeMessage) -> Reaction;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub kind: MessageKind,
    pub summary: String,
    pub reaction: Reaction,
}

/// Decodes one text frame.
pub fn parse_frame(frame: &str) -> Result<ServerMessage, MonitorError> {
    let message: ServerMessage =
        serde_json::from_str(frame).map_err(|err| MonitorError::Parse(err.to_string()))?;

    if let ServerMessage::Inference(inference) = &message {
        if inference.probs.len() != CLASS_COUNT {
            return Err(MonitorError::Parse(format!(
                "inference carries {} probabilities, expected {}",
                inference.probs.len(),
                CLASS_COUNT
            )));
        }
    }

    Ok(message)
}

/// Hands a decoded message to the matching handler method. Unrecognized
/// kinds reach no handler.
pub fn dispatch<H: MessageHandler>(message: ServerMessage, handler: &mut H) -> Dispatched {
    let kind = message.kind();
    let summary = message.summary();

    let reaction = match message {
        ServerMessage::Inference(m) => handler.on_inference(m),
        ServerMessage::DepthData(m) => handler.on_depth_data(m),
        ServerMessage::SessionComplete(m) => handler.on_session_complete(m),
        ServerMessage::SessionReset(m) => handler.on_session_reset(m),
        ServerMessage::ModeChange(m) => handler.on_mode_change(m),
        ServerMessage::Unrecognized => Reaction::None,
    };

    Dispatched {
        kind,
        summary,
        reaction,
    }
}

pub fn route<H: MessageHandler>(frame: &str, handler: &mut H) -> Result<Dispatched, MonitorError> {
    parse_frame(frame).map(|message| dispatch(message, handler))
}

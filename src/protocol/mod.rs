pub mod messages;
pub mod router;

pub use messages::{
    DepthDataMessage, InferenceMessage, MessageKind, ModeChangeMessage, ServerMessage,
    SessionEventMessage,
};
pub use router::{dispatch, parse_frame, route, Dispatched, MessageHandler, Reaction};

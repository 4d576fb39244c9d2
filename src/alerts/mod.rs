pub mod classifier;

pub use classifier::{
    classify, classify_at, session_cleared_alert, session_complete_message, SESSION_RESET_MESSAGE,
};

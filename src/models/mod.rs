pub mod alert;
pub mod inference;
pub mod session;

pub use alert::{Alert, AlertSeverity};
pub use inference::{InferenceResult, CLASS_COUNT};
pub use session::{DepthPoint, SessionPhase, WindowMode, SESSION_COMPRESSION_LIMIT};

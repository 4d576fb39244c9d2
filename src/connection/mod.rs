pub mod backoff;
pub mod controller;
pub mod loop_worker;
pub mod state;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use controller::ConnectionManager;
pub use loop_worker::{ConnectionEvent, ConnectionEventKind};
pub use state::ConnectionState;
pub use transport::{FrameStream, Transport, WebSocketTransport};

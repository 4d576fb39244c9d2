pub mod controller;
mod health;
pub mod state;

pub use controller::SessionController;
pub use state::{SessionSnapshot, SessionState, DEPTH_SERIES_CAPACITY};

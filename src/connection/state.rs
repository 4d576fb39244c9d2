use serde::{Deserialize, Serialize};

/// Link status, written only by the connection manager and its worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub connected: bool,
    pub reconnect_attempt: u32,
    pub last_error: Option<String>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_open(&mut self) {
        self.connected = true;
        self.reconnect_attempt = 0;
        self.last_error = None;
    }

    pub fn mark_closed(&mut self, error: Option<String>) {
        self.connected = false;
        if error.is_some() {
            self.last_error = error;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

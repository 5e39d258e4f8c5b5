use meshcall_core::IceServerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_STUN_ADDR: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_2: &str = "stun:stun1.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_3: &str = "stun:stun2.l.google.com:19302";

/// Room session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long `join` waits for the channel subscription to be confirmed.
    pub subscribe_timeout_ms: u64,
    /// Capacity of the command queue between the session handle and its room task.
    pub command_buffer: usize,
}

impl SessionConfig {
    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subscribe_timeout_ms: 10_000,
            command_buffer: 64,
        }
    }
}

/// WebRTC settings (STUN/TURN).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![
                IceServerConfig::stun(DEFAULT_STUN_ADDR),
                IceServerConfig::stun(DEFAULT_STUN_ADDR_2),
                IceServerConfig::stun(DEFAULT_STUN_ADDR_3),
            ],
        }
    }
}

//! Unified TX/RX logging
//!
//! Best-effort hex dumps of raw bus traffic for diagnostics. Gated by the
//! `debug` log level, so production deployments pay only for the level
//! check.

use tracing::debug;

/// Format a byte slice as space-separated hex pairs
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

/// Per-channel raw traffic logger
#[derive(Debug, Clone)]
pub struct ChannelLogger {
    channel: String,
}

impl ChannelLogger {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    pub fn log_tx(&self, data: &[u8]) {
        debug!("[{}] TX [{}B]: {}", self.channel, data.len(), hex_dump(data));
    }

    pub fn log_rx(&self, data: &[u8]) {
        debug!("[{}] RX [{}B]: {}", self.channel, data.len(), hex_dump(data));
    }
}

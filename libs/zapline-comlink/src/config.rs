//! Hardware port configuration
//!
//! Deserializable description of the RS485 port, filled in by the
//! configuration-loading code of the embedding application. Field defaults
//! match the stock wiring of the controller (57600 baud, 8N1, 256-byte
//! buffers).

use serde::{Deserialize, Serialize};

/// RS485 port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    /// Serial device path, e.g. `/dev/ttyUSB0`
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,

    /// "None", "Even" or "Odd"
    #[serde(default = "default_parity")]
    pub parity: String,

    #[serde(default = "default_buffer_size")]
    pub rx_buffer_size: usize,

    #[serde(default = "default_buffer_size")]
    pub tx_buffer_size: usize,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
            rx_buffer_size: default_buffer_size(),
            tx_buffer_size: default_buffer_size(),
        }
    }
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    57600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_parity() -> String {
    "None".to_string()
}

fn default_buffer_size() -> usize {
    256
}

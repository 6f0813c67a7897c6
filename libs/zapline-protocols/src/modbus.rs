//! Modbus RTU protocol implementation
//!
//! Master-side Modbus RTU for a multidrop RS485 bus:
//! - Function codes 0x03 (read holding registers), 0x06 (write single
//!   register), 0x10 (write multiple registers)
//! - RTU framing with CRC16 trailer (reflected 0xA001, init 0xFFFF,
//!   transmitted low byte first)
//! - Exception responses (function code bit 7 + one code byte)
//! - Per-bus statistics and sticky last-exception for diagnostics
//!
//! The master never retries internally; timeouts and CRC errors are
//! reported to the caller, which owns the retry policy.

mod constants;
mod error;
mod frame;
mod master;
mod pdu;

#[cfg(feature = "sim")]
pub mod sim;

pub use constants::*;
pub use error::{ExceptionCode, ModbusError, ModbusResult};
pub use frame::{crc16, decode_frame, encode_frame};
pub use master::ModbusRtuMaster;
pub use pdu::{ModbusPdu, PduBuilder};

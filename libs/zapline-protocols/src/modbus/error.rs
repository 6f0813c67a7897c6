//! Modbus error types
//!
//! Protocol-level failure taxonomy layered over the transport errors from
//! `zapline-comlink`. Timeouts and CRC mismatches are transient and safe to
//! retry at the caller's discretion; exception responses are semantic
//! rejections by the device and usually are not.

use std::fmt;

use thiserror::Error;
use zapline_comlink::BusError;

/// Result type for Modbus operations
pub type ModbusResult<T> = std::result::Result<T, ModbusError>;

/// Device-reported exception codes (the byte following an exception
/// function code)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    Acknowledge,
    SlaveDeviceBusy,
    NegativeAcknowledge,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetFailed,
    Other(u8),
}

impl ExceptionCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::SlaveDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::SlaveDeviceBusy,
            0x07 => ExceptionCode::NegativeAcknowledge,
            0x08 => ExceptionCode::MemoryParityError,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetFailed,
            other => ExceptionCode::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::SlaveDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::SlaveDeviceBusy => 0x06,
            ExceptionCode::NegativeAcknowledge => 0x07,
            ExceptionCode::MemoryParityError => 0x08,
            ExceptionCode::GatewayPathUnavailable => 0x0A,
            ExceptionCode::GatewayTargetFailed => 0x0B,
            ExceptionCode::Other(code) => code,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ExceptionCode::IllegalFunction => "Illegal Function",
            ExceptionCode::IllegalDataAddress => "Illegal Data Address",
            ExceptionCode::IllegalDataValue => "Illegal Data Value",
            ExceptionCode::SlaveDeviceFailure => "Slave Device Failure",
            ExceptionCode::Acknowledge => "Acknowledge",
            ExceptionCode::SlaveDeviceBusy => "Slave Device Busy",
            ExceptionCode::NegativeAcknowledge => "Negative Acknowledge",
            ExceptionCode::MemoryParityError => "Memory Parity Error",
            ExceptionCode::GatewayPathUnavailable => "Gateway Path Unavailable",
            ExceptionCode::GatewayTargetFailed => "Gateway Target Device Failed to Respond",
            ExceptionCode::Other(_) => "Unknown Exception",
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", self.as_u8(), self.description())
    }
}

/// Modbus master errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModbusError {
    /// Transport failure below the protocol layer
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Request rejected before touching the wire
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Response shorter than a minimal RTU frame
    #[error("Response too short: {len} bytes")]
    ShortResponse { len: usize },

    /// Response CRC did not verify; nothing in the frame can be trusted
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Device rejected the request
    #[error("Modbus exception: {0}")]
    Exception(ExceptionCode),

    /// Read response declared a byte count inconsistent with the request
    #[error("Unexpected byte count: expected {expected}, got {actual}")]
    UnexpectedByteCount { expected: usize, actual: usize },

    /// Write acknowledgement does not echo the request
    #[error("Write response does not echo request")]
    UnexpectedEcho,
}

impl ModbusError {
    /// Transient failures the caller may reasonably retry. Exception
    /// responses and echo/byte-count violations are not in this set.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModbusError::Bus(bus) => bus.is_timeout(),
            ModbusError::CrcMismatch { .. } => true,
            _ => false,
        }
    }
}

//! Modbus protocol constants based on the official specification
//!
//! Limits are derived from the RS485 ADU ceiling of 256 bytes:
//! ADU (256) - slave address (1) - CRC (2) = 253 bytes of PDU.

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum RTU ADU: slave address + PDU + CRC
pub const MAX_FRAME_SIZE: usize = 256;

/// Smallest decodable RTU frame: address + function code + CRC
pub const MIN_FRAME_SIZE: usize = 4;

/// Receive buffer size for one response frame
pub const RESPONSE_BUFFER_SIZE: usize = 256;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum registers per FC03 read
///
/// Response PDU: FC(1) + byte count(1) + N*2 <= 253, so N <= 125.
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum registers per FC16 write
///
/// Request PDU: FC(1) + address(2) + quantity(2) + byte count(1) + N*2 <= 253,
/// so N <= 123.
pub const MAX_WRITE_REGISTERS: u16 = 123;

// ============================================================================
// Addressing
// ============================================================================

/// Lowest addressable slave (0 is broadcast, unsupported here)
pub const SLAVE_ADDR_MIN: u8 = 1;

/// Highest addressable slave
pub const SLAVE_ADDR_MAX: u8 = 247;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Set on the response function code when the slave rejects a request
pub const EXCEPTION_BIT: u8 = 0x80;

// ============================================================================
// Timing
// ============================================================================

/// Default response timeout per transaction
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 100;

/// Suggested retry budget for callers. The master itself never retries -
/// hidden retries would distort its timing guarantees.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Suggested base delay between caller-level retries
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;

//! RTU framing and CRC16
//!
//! Frame layout: `[slave_addr][function_code][payload...][crc_lo][crc_hi]`.
//! The CRC covers address + PDU and is transmitted low byte first. The CRC
//! itself is the standard Modbus reflected polynomial 0xA001 with initial
//! value 0xFFFF, computed against a lookup table built at compile time.

use super::constants::MIN_FRAME_SIZE;
use super::error::{ModbusError, ModbusResult};
use super::pdu::ModbusPdu;

const fn build_crc_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u16; 256] = build_crc_table();

/// Modbus CRC16: reflected polynomial 0xA001, initial value 0xFFFF
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        let index = ((crc ^ u16::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC_TABLE[index];
    }
    crc
}

/// Build a complete RTU frame: address + PDU + CRC (little-endian)
pub fn encode_frame(slave_addr: u8, pdu: &ModbusPdu) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + pdu.len() + 2);
    frame.push(slave_addr);
    frame.extend_from_slice(pdu.as_slice());
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Validate length and CRC, returning `(slave_addr, pdu_bytes)`.
///
/// A CRC failure takes priority over everything past the length check - an
/// exception byte in a corrupt frame cannot be trusted.
pub fn decode_frame(frame: &[u8]) -> ModbusResult<(u8, &[u8])> {
    if frame.len() < MIN_FRAME_SIZE {
        return Err(ModbusError::ShortResponse { len: frame.len() });
    }

    let body = &frame[..frame.len() - 2];
    let actual = u16::from_le_bytes([frame[frame.len() - 2], frame[frame.len() - 1]]);
    let expected = crc16(body);
    if actual != expected {
        return Err(ModbusError::CrcMismatch { expected, actual });
    }

    Ok((body[0], &body[1..]))
}

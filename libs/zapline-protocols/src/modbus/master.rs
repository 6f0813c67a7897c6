//! Modbus RTU master session
//!
//! One `ModbusRtuMaster` per physical bus, shared by every device driver
//! addressing slaves on that bus. The master owns the per-bus statistics
//! block and the sticky last-exception cell; the underlying
//! [`SerialChannel`] guarantees wire-level exclusivity.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use zapline_comlink::{BusStats, SerialChannel, StatsSnapshot};

use super::constants::{
    DEFAULT_RESPONSE_TIMEOUT_MS, EXCEPTION_BIT, FC_READ_HOLDING_REGISTERS,
    FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_REGISTER, MAX_READ_REGISTERS,
    MAX_WRITE_REGISTERS, RESPONSE_BUFFER_SIZE, SLAVE_ADDR_MAX, SLAVE_ADDR_MIN,
};
use super::error::{ExceptionCode, ModbusError, ModbusResult};
use super::frame::{decode_frame, encode_frame};
use super::pdu::{ModbusPdu, PduBuilder};

/// Modbus RTU master over one shared bus channel
#[derive(Debug)]
pub struct ModbusRtuMaster {
    channel: Arc<SerialChannel>,
    response_timeout: Duration,
    /// Exception from the most recent completed transaction; `None`
    /// whenever that transaction returned no exception
    last_exception: Mutex<Option<ExceptionCode>>,
    stats: BusStats,
}

impl ModbusRtuMaster {
    /// Create a master with the default response timeout
    pub fn new(channel: Arc<SerialChannel>) -> Self {
        Self::with_timeout(channel, Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS))
    }

    pub fn with_timeout(channel: Arc<SerialChannel>, response_timeout: Duration) -> Self {
        info!(
            "Modbus RTU master initialized on {}, timeout={}ms",
            channel.name(),
            response_timeout.as_millis()
        );
        Self {
            channel,
            response_timeout,
            last_exception: Mutex::new(None),
            stats: BusStats::new(),
        }
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Exception code reported by the most recent transaction, if any
    pub fn last_exception(&self) -> Option<ExceptionCode> {
        *self.last_exception.lock()
    }

    /// Read-only snapshot of the per-bus transaction counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Clear the counters (explicit operator action)
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Account one caller-level retry. The master never retries on its own.
    pub fn record_retry(&self) {
        self.stats.record_retry();
    }

    /// Read holding registers (FC 0x03). `count` must be 1..=125; values are
    /// returned in request order.
    pub async fn read_holding_registers(
        &self,
        slave_addr: u8,
        start_reg: u16,
        count: u16,
    ) -> ModbusResult<Vec<u16>> {
        check_slave_addr(slave_addr)?;
        if count == 0 || count > MAX_READ_REGISTERS {
            return Err(ModbusError::InvalidRequest(format!(
                "register count {count} out of range 1..={MAX_READ_REGISTERS}"
            )));
        }

        let request = PduBuilder::new()
            .function_code(FC_READ_HOLDING_REGISTERS)?
            .address(start_reg)?
            .quantity(count)?
            .build();

        debug!("read regs: slave={slave_addr}, start=0x{start_reg:04X}, count={count}");

        self.execute(slave_addr, &request, |pdu| {
            let expected = count as usize * 2;
            let declared = pdu.get(1).copied().unwrap_or(0) as usize;
            if declared != expected {
                return Err(ModbusError::UnexpectedByteCount {
                    expected,
                    actual: declared,
                });
            }
            if pdu.len() != 2 + expected {
                return Err(ModbusError::UnexpectedByteCount {
                    expected,
                    actual: pdu.len().saturating_sub(2),
                });
            }

            let mut values = Vec::with_capacity(count as usize);
            for chunk in pdu[2..].chunks_exact(2) {
                values.push(u16::from_be_bytes([chunk[0], chunk[1]]));
            }
            Ok(values)
        })
        .await
    }

    /// Write a single holding register (FC 0x06). The acknowledgement must
    /// echo the request exactly.
    pub async fn write_single_register(
        &self,
        slave_addr: u8,
        reg_addr: u16,
        value: u16,
    ) -> ModbusResult<()> {
        check_slave_addr(slave_addr)?;

        let request = PduBuilder::new()
            .function_code(FC_WRITE_SINGLE_REGISTER)?
            .address(reg_addr)?
            .value(value)?
            .build();

        debug!("write reg: slave={slave_addr}, reg=0x{reg_addr:04X}, value=0x{value:04X}");

        self.execute(slave_addr, &request, |pdu| {
            if pdu.len() < 5
                || pdu[1..3] != reg_addr.to_be_bytes()
                || pdu[3..5] != value.to_be_bytes()
            {
                return Err(ModbusError::UnexpectedEcho);
            }
            Ok(())
        })
        .await
    }

    /// Write a block of holding registers (FC 0x10). `values` must hold
    /// 1..=123 entries; the acknowledgement echoes start address and count.
    pub async fn write_multiple_registers(
        &self,
        slave_addr: u8,
        start_reg: u16,
        values: &[u16],
    ) -> ModbusResult<()> {
        check_slave_addr(slave_addr)?;
        let count = values.len();
        if count == 0 || count > MAX_WRITE_REGISTERS as usize {
            return Err(ModbusError::InvalidRequest(format!(
                "register count {count} out of range 1..={MAX_WRITE_REGISTERS}"
            )));
        }

        let mut builder = PduBuilder::new()
            .function_code(FC_WRITE_MULTIPLE_REGISTERS)?
            .address(start_reg)?
            .quantity(count as u16)?
            .byte((count * 2) as u8)?;
        for &v in values {
            builder = builder.value(v)?;
        }
        let request = builder.build();

        debug!("write multi regs: slave={slave_addr}, start=0x{start_reg:04X}, count={count}");

        self.execute(slave_addr, &request, |pdu| {
            if pdu.len() < 5
                || pdu[1..3] != start_reg.to_be_bytes()
                || pdu[3..5] != (count as u16).to_be_bytes()
            {
                return Err(ModbusError::UnexpectedEcho);
            }
            Ok(())
        })
        .await
    }

    /// One wire transaction with the full validation ladder.
    ///
    /// Order is fixed: transport, minimum length, CRC, exception bit, then
    /// address/function echo and the operation-specific `parse` step. Each
    /// completed transaction increments `tx_count` and exactly one of
    /// `rx_count`/`error_count`.
    async fn execute<T>(
        &self,
        slave_addr: u8,
        request: &ModbusPdu,
        parse: impl FnOnce(&[u8]) -> ModbusResult<T>,
    ) -> ModbusResult<T> {
        let frame = encode_frame(slave_addr, request);
        let mut response = [0u8; RESPONSE_BUFFER_SIZE];

        *self.last_exception.lock() = None;
        self.stats.record_tx();

        let received = match self
            .channel
            .transact(&frame, &mut response, self.response_timeout)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                self.stats.record_error();
                if e.is_timeout() {
                    self.stats.record_timeout();
                }
                error!("transaction failed: slave={slave_addr}: {e}");
                return Err(e.into());
            },
        };

        let (addr, pdu) = match decode_frame(&response[..received]) {
            Ok(parts) => parts,
            Err(e) => {
                self.stats.record_error();
                if matches!(e, ModbusError::CrcMismatch { .. }) {
                    self.stats.record_crc_error();
                }
                error!("invalid response: slave={slave_addr}: {e}");
                return Err(e);
            },
        };

        // Exception bit outranks echo validation: a rejection frame carries
        // the exception function code, not the request's
        if pdu.first().is_some_and(|fc| fc & EXCEPTION_BIT != 0) {
            let code = ExceptionCode::from_u8(pdu.get(1).copied().unwrap_or(0));
            *self.last_exception.lock() = Some(code);
            self.stats.record_error();
            warn!("slave {slave_addr} exception: {code}");
            return Err(ModbusError::Exception(code));
        }

        if addr != slave_addr || pdu.first().copied() != request.function_code() {
            self.stats.record_error();
            error!(
                "echo mismatch: expected slave={slave_addr}, got addr={addr}, fc={:02X?}",
                pdu.first()
            );
            return Err(ModbusError::UnexpectedEcho);
        }

        match parse(pdu) {
            Ok(value) => {
                self.stats.record_rx();
                Ok(value)
            },
            Err(e) => {
                self.stats.record_error();
                error!("malformed response: slave={slave_addr}: {e}");
                Err(e)
            },
        }
    }
}

fn check_slave_addr(slave_addr: u8) -> ModbusResult<()> {
    if !(SLAVE_ADDR_MIN..=SLAVE_ADDR_MAX).contains(&slave_addr) {
        return Err(ModbusError::InvalidRequest(format!(
            "slave address {slave_addr} out of range {SLAVE_ADDR_MIN}..={SLAVE_ADDR_MAX}"
        )));
    }
    Ok(())
}

//! # Zapline Protocols - Modbus RTU Master
//!
//! Modbus RTU master session for the Zapline actuator control stack.
//!
//! ## Architecture
//!
//! ```text
//! zapline-protocols/modbus
//!     ├── ModbusRtuMaster (one session per physical bus)
//!     ├── frame (RTU framing + table-driven CRC16)
//!     ├── ModbusPdu / PduBuilder (stack-allocated PDU)
//!     ├── constants (function codes, limits, exception codes)
//!     └── sim (register-map slave for virtual buses, feature `sim`)
//! ```
//!
//! The master consumes a [`zapline_comlink::SerialChannel`] and adds the
//! Modbus RTU application layer: frame construction, CRC validation,
//! exception decoding, and per-bus transaction statistics. Validation is
//! strict and ordered - transport success, minimum length, CRC, exception
//! bit, echo checks - so higher layers never see a malformed frame.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use zapline_comlink::{PortConfig, SerialChannel};
//! use zapline_protocols::modbus::ModbusRtuMaster;
//!
//! # async fn example() -> zapline_protocols::modbus::ModbusResult<()> {
//! let channel = Arc::new(SerialChannel::open(&PortConfig::default()).await?);
//! let master = ModbusRtuMaster::new(channel);
//!
//! let values = master.read_holding_registers(1, 0x0096, 5).await?;
//! master.write_single_register(1, 0x0086, 2048).await?;
//! # Ok(())
//! # }
//! ```

pub mod modbus;

pub use modbus::{ExceptionCode, ModbusError, ModbusResult, ModbusRtuMaster};

//! Bus Link Layer for Zapline
//!
//! This crate owns the physical half-duplex RS485 line and everything the
//! protocol layers above it share:
//!
//! ```text
//! zapline-comlink
//!     ├── BusLink (serial or in-memory bus endpoint)
//!     ├── SerialChannel (mutex-serialized send/wait/receive transactions)
//!     ├── BusError (transport error taxonomy)
//!     ├── BusStats (per-bus monotonic transaction counters)
//!     ├── ChannelLogger (TX/RX hex dumps)
//!     └── PortConfig (hardware port configuration)
//! ```
//!
//! A `SerialChannel` is created once per physical bus and shared by reference
//! with every protocol session addressing slaves on that bus. The channel
//! guarantees that at most one request/response exchange is in flight at any
//! time and that every wait it performs is bounded by the caller's timeout.

pub mod channel;
pub mod config;
pub mod error;
pub mod logging;
pub mod stats;

pub use channel::{BusLink, SerialChannel, TURNAROUND_DELAY};
pub use config::PortConfig;
pub use error::{BusError, Result};
pub use logging::ChannelLogger;
pub use stats::{BusStats, StatsSnapshot};

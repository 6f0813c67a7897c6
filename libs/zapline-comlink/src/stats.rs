//! Per-bus transaction statistics
//!
//! Monotonic counters, one block per physical bus, owned by the protocol
//! session that drives the bus. Counters are atomics so the owning session
//! can stay `&self`; the bus mutex already serializes the transactions that
//! update them. Reset only by explicit operator action.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic transaction counters for one bus
#[derive(Debug, Default)]
pub struct BusStats {
    tx_count: AtomicU64,
    rx_count: AtomicU64,
    error_count: AtomicU64,
    timeout_count: AtomicU64,
    crc_error_count: AtomicU64,
    retry_count: AtomicU64,
}

/// Point-in-time copy of [`BusStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Requests put on the wire
    pub tx_count: u64,
    /// Fully validated responses
    pub rx_count: u64,
    /// Failed transactions of any kind
    pub error_count: u64,
    /// Subset of errors: a bounded wait elapsed
    pub timeout_count: u64,
    /// Subset of errors: response CRC did not verify
    pub crc_error_count: u64,
    /// Caller-level retries (never incremented by the engine itself)
    pub retry_count: u64,
}

impl BusStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tx(&self) {
        self.tx_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rx(&self) {
        self.rx_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeout_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crc_error(&self) {
        self.crc_error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tx_count: self.tx_count.load(Ordering::Relaxed),
            rx_count: self.rx_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            timeout_count: self.timeout_count.load(Ordering::Relaxed),
            crc_error_count: self.crc_error_count.load(Ordering::Relaxed),
            retry_count: self.retry_count.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.tx_count.store(0, Ordering::Relaxed);
        self.rx_count.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        self.timeout_count.store(0, Ordering::Relaxed);
        self.crc_error_count.store(0, Ordering::Relaxed);
        self.retry_count.store(0, Ordering::Relaxed);
    }
}

impl StatsSnapshot {
    /// Accounting invariant: every transmitted request ended as exactly one
    /// of a validated response or an error.
    pub fn is_balanced(&self) -> bool {
        self.rx_count + self.error_count == self.tx_count
    }
}

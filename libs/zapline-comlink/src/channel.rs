//! Half-duplex serial channel
//!
//! One `SerialChannel` owns one physical RS485 line. All protocol traffic
//! goes through [`SerialChannel::transact`], which serializes exchanges with
//! a mutex, flushes stale RX bytes before transmitting, observes the
//! half-duplex turnaround delay, and bounds every wait with the caller's
//! timeout budget.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{info, warn};

use crate::config::PortConfig;
use crate::error::{BusError, Result};
use crate::logging::ChannelLogger;

/// Half-duplex settle time between TX completion and listening for the
/// response. Modbus requires 3.5 char times minimum; at 57600 baud that is
/// about 0.6 ms, 2 ms covers every supported baud rate.
pub const TURNAROUND_DELAY: Duration = Duration::from_millis(2);

/// Gap that closes a frame once at least one response byte has arrived.
const INTER_BYTE_TIMEOUT: Duration = Duration::from_millis(10);

/// Zero-wait poll window used when draining stale RX bytes.
const DRAIN_POLL: Duration = Duration::from_millis(1);

/// Physical or virtual bus endpoint
///
/// `Serial` is the hardware RS485 line. `Memory` is one end of an in-process
/// duplex pipe, used to attach simulated slaves for bench setups and tests.
#[derive(Debug)]
pub enum BusLink {
    Serial(SerialStream),
    Memory(DuplexStream),
}

impl BusLink {
    /// Open the hardware serial port described by `config`
    pub async fn open_serial(config: &PortConfig) -> Result<Self> {
        let parity = match config.parity.as_str() {
            "Even" => tokio_serial::Parity::Even,
            "Odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        };

        let data_bits = match config.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        let stop_bits = match config.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        let stream = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .open_native_async()
            .map_err(|e| {
                BusError::config(format!("failed to open serial port {}: {e}", config.port))
            })?;

        info!("serial link opened: {} @{}baud", config.port, config.baud_rate);
        Ok(BusLink::Serial(stream))
    }

    /// Create an in-memory link and hand back the peer end
    ///
    /// The peer end is where a simulated slave reads requests and writes
    /// responses.
    pub fn memory(capacity: usize) -> (Self, DuplexStream) {
        let (near, far) = tokio::io::duplex(capacity);
        (BusLink::Memory(near), far)
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            BusLink::Serial(port) => {
                port.write_all(data).await?;
                port.flush().await?;
            },
            BusLink::Memory(pipe) => {
                pipe.write_all(data).await?;
                pipe.flush().await?;
            },
        }
        Ok(())
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            BusLink::Serial(port) => port.read(buf).await,
            BusLink::Memory(pipe) => pipe.read(buf).await,
        }
    }

    /// Collect one response frame.
    ///
    /// Waits up to `overall` for the first byte, then keeps reading until an
    /// inter-byte gap, the buffer filling up, or the overall budget closes
    /// the frame. Zero bytes is an [`BusError::RxTimeout`]; judging whether
    /// the bytes form a complete frame is the protocol layer's job.
    async fn recv(&mut self, buf: &mut [u8], overall: Duration) -> Result<usize> {
        let deadline = Instant::now() + overall;
        let mut total = 0usize;

        loop {
            if total == buf.len() {
                break;
            }
            let window = if total == 0 {
                deadline.saturating_duration_since(Instant::now())
            } else {
                INTER_BYTE_TIMEOUT
            };
            if window.is_zero() {
                break;
            }

            match timeout(window, self.read_some(&mut buf[total..])).await {
                Ok(Ok(0)) => return Err(BusError::io("bus link closed")),
                Ok(Ok(n)) => total += n,
                Ok(Err(e)) => return Err(e.into()),
                // Inter-byte gap after at least one byte means frame complete
                Err(_) if total > 0 => break,
                Err(_) => return Err(BusError::RxTimeout),
            }
        }

        if total == 0 {
            return Err(BusError::RxTimeout);
        }
        Ok(total)
    }

    /// Discard anything sitting in the receive path (noise, or a late
    /// response to a previous failed exchange).
    async fn drain(&mut self) {
        match self {
            BusLink::Serial(port) => {
                if let Err(e) = port.clear(ClearBuffer::Input) {
                    warn!("RX flush failed: {e}");
                }
            },
            BusLink::Memory(pipe) => {
                let mut scratch = [0u8; 64];
                while let Ok(Ok(n)) = timeout(DRAIN_POLL, pipe.read(&mut scratch)).await {
                    if n == 0 {
                        break;
                    }
                }
            },
        }
    }
}

/// Mutex-serialized half-duplex channel over one [`BusLink`]
#[derive(Debug)]
pub struct SerialChannel {
    link: Mutex<BusLink>,
    name: String,
    baud_rate: u32,
    logger: ChannelLogger,
}

impl SerialChannel {
    /// Open the hardware port and wrap it in a channel
    pub async fn open(config: &PortConfig) -> Result<Self> {
        let link = BusLink::open_serial(config).await?;
        Ok(Self::with_link(link, &config.port, config.baud_rate))
    }

    /// Wrap an already-open link (hardware or memory)
    pub fn with_link(link: BusLink, name: &str, baud_rate: u32) -> Self {
        Self {
            link: Mutex::new(link),
            name: name.to_string(),
            baud_rate,
            logger: ChannelLogger::new(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// One exclusive send/wait/receive exchange.
    ///
    /// Every wait inside - mutex acquisition, TX completion, response - is
    /// bounded by `budget`. The bus mutex is released on every exit path.
    pub async fn transact(
        &self,
        tx_frame: &[u8],
        rx_buf: &mut [u8],
        budget: Duration,
    ) -> Result<usize> {
        if tx_frame.is_empty() {
            return Err(BusError::invalid_argument("empty TX frame"));
        }
        if budget.is_zero() {
            return Err(BusError::invalid_argument("zero timeout budget"));
        }

        let mut link = timeout(budget, self.link.lock()).await.map_err(|_| {
            BusError::busy(format!(
                "bus {} not acquired within {}ms",
                self.name,
                budget.as_millis()
            ))
        })?;

        link.drain().await;

        self.logger.log_tx(tx_frame);
        timeout(budget, link.send(tx_frame))
            .await
            .map_err(|_| BusError::TxTimeout)??;

        sleep(TURNAROUND_DELAY).await;

        let received = link.recv(rx_buf, budget).await?;
        self.logger.log_rx(&rx_buf[..received]);
        Ok(received)
    }
}

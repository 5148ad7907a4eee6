//! Serial port line source.
//!
//! # Architecture
//!
//! ```text
//! serial port --(blocking read, timeout)--> reader thread
//!     reader thread --(SerialLineCodec)--> mpsc<String> --> SerialLineSource::next_line
//! ```
//!
//! A dedicated OS thread owns the port and blocks in `read` with a timeout,
//! so no async worker is ever parked on device I/O. When the port fails
//! the thread marks the device disconnected, reopens it with exponential
//! backoff and carries on. The thread exits once the [`SerialLineSource`]
//! is dropped.
//!
//! Opening the port at startup is strict: if the device cannot be opened,
//! [`SerialLineSource::open`] fails with `HardwareError::Unavailable`.

use std::io::{self, Read};
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tracing::{debug, error, info, trace, warn};

use cardbridge_core::{Backoff, BridgeConfig};
use cardbridge_core::constants::{RECONNECT_INITIAL_BACKOFF_MS, RECONNECT_MAX_BACKOFF_MS};
use cardbridge_protocol::SerialLineCodec;

use crate::types::DeviceStatus;
use crate::{HardwareError, LineSource, Result};

/// Lines buffered between the reader thread and the consumer.
const LINE_CHANNEL_CAPACITY: usize = 64;

/// Bytes requested per `read` call.
const READ_CHUNK_SIZE: usize = 256;

/// Serial port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl SerialConfig {
    /// Settings for `port` at `baud_rate` with default timeout and backoff.
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            read_timeout: Duration::from_secs(1),
            initial_backoff: Duration::from_millis(RECONNECT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(RECONNECT_MAX_BACKOFF_MS),
        }
    }

    /// Set the blocking read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the reconnect backoff bounds.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }
}

impl From<&BridgeConfig> for SerialConfig {
    fn from(config: &BridgeConfig) -> Self {
        SerialConfig::new(config.serial_port.clone(), config.baud_rate)
            .with_read_timeout(config.serial_timeout)
    }
}

/// Line source backed by a serial port.
#[derive(Debug)]
pub struct SerialLineSource {
    line_rx: mpsc::Receiver<String>,
    status: DeviceStatus,
}

impl SerialLineSource {
    /// Open the port and start the reader thread.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Unavailable` if the port cannot be opened and
    /// `HardwareError::Io` if the reader thread cannot be spawned.
    pub fn open(config: SerialConfig) -> Result<Self> {
        let port = open_port(&config)
            .map_err(|e| HardwareError::unavailable(&config.port, e.to_string()))?;

        info!(
            port = %config.port,
            baud = config.baud_rate,
            "Serial port opened"
        );

        let status = DeviceStatus::new(config.port.clone(), true);
        let (line_tx, line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let reader = ReadLoop::new(
            config.port.clone(),
            line_tx,
            status.clone(),
            Backoff::new(config.initial_backoff, config.max_backoff),
        );

        thread::Builder::new()
            .name(format!("serial-{}", config.port))
            .spawn(move || reader.run(port, || open_port(&config)))?;

        Ok(Self { line_rx, status })
    }
}

impl LineSource for SerialLineSource {
    async fn next_line(&mut self) -> Result<String> {
        self.line_rx
            .recv()
            .await
            .ok_or_else(|| HardwareError::disconnected(self.status.device()))
    }

    fn status(&self) -> DeviceStatus {
        self.status.clone()
    }
}

fn open_port(config: &SerialConfig) -> io::Result<Box<dyn serialport::SerialPort>> {
    serialport::new(&config.port, config.baud_rate)
        .timeout(config.read_timeout)
        .open()
        .map_err(io::Error::from)
}

/// Body of the reader thread.
struct ReadLoop {
    device: String,
    line_tx: mpsc::Sender<String>,
    status: DeviceStatus,
    backoff: Backoff,
}

impl ReadLoop {
    fn new(
        device: String,
        line_tx: mpsc::Sender<String>,
        status: DeviceStatus,
        backoff: Backoff,
    ) -> Self {
        Self {
            device,
            line_tx,
            status,
            backoff,
        }
    }

    /// Read until the consumer goes away.
    fn run<R, F>(mut self, mut port: R, mut reopen: F)
    where
        R: Read,
        F: FnMut() -> io::Result<R>,
    {
        let mut codec = SerialLineCodec::new();
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if self.line_tx.is_closed() {
                debug!(device = %self.device, "Line consumer gone, stopping serial reader");
                return;
            }

            let lost = match port.read(&mut chunk) {
                Ok(0) => Some(io::Error::from(io::ErrorKind::UnexpectedEof)),
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if !self.forward_lines(&mut codec, &mut buf) {
                        return;
                    }
                    None
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    None
                }
                Err(e) => Some(e),
            };

            if let Some(e) = lost {
                error!(device = %self.device, error = %e, "Serial device lost");
                self.status.set_connected(false);
                buf.clear();
                codec = SerialLineCodec::new();

                match self.reconnect(&mut reopen) {
                    Some(reopened) => port = reopened,
                    None => return,
                }
            }
        }
    }

    /// Decode every complete line in `buf` and send it on.
    ///
    /// Returns `false` if the consumer has gone away.
    fn forward_lines(&self, codec: &mut SerialLineCodec, buf: &mut BytesMut) -> bool {
        loop {
            match codec.decode(buf) {
                Ok(Some(line)) => {
                    trace!(device = %self.device, len = line.len(), "Serial line received");
                    if self.line_tx.blocking_send(line).is_err() {
                        return false;
                    }
                }
                Ok(None) => return true,
                Err(e) => {
                    warn!(device = %self.device, error = %e, "Dropping undecodable serial line");
                }
            }
        }
    }

    fn reconnect<R, F>(&mut self, reopen: &mut F) -> Option<R>
    where
        F: FnMut() -> io::Result<R>,
    {
        self.backoff.reset();
        loop {
            let delay = self.backoff.next_delay();
            thread::sleep(delay);

            if self.line_tx.is_closed() {
                return None;
            }

            match reopen() {
                Ok(port) => {
                    info!(device = %self.device, "Serial device reconnected");
                    self.status.set_connected(true);
                    return Some(port);
                }
                Err(e) => {
                    warn!(
                        device = %self.device,
                        error = %e,
                        retry_in_ms = self.backoff.current().as_millis() as u64,
                        "Serial reconnect failed"
                    );
                }
            }
        }
    }
}

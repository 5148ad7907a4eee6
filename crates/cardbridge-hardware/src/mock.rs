//! Mock line source for testing and demos.
//!
//! Lines are pushed through a [`MockLineSourceHandle`] instead of a serial
//! port, so the whole bridge can run without a device attached.

use tokio::sync::mpsc;

use crate::types::DeviceStatus;
use crate::{HardwareError, LineSource, Result};

const MOCK_DEVICE_NAME: &str = "mock";

/// Channel-fed line source.
///
/// # Examples
///
/// ```
/// use cardbridge_hardware::{LineSource, MockLineSource};
///
/// #[tokio::main]
/// async fn main() -> cardbridge_hardware::Result<()> {
///     let (mut source, handle) = MockLineSource::new();
///
///     tokio::spawn(async move {
///         handle.send_line("UID:RF001234").await.unwrap();
///         handle.send_line("PIN:123456").await.unwrap();
///     });
///
///     assert_eq!(source.next_line().await?, "UID:RF001234");
///     assert_eq!(source.next_line().await?, "PIN:123456");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockLineSource {
    line_rx: mpsc::Receiver<String>,
    status: DeviceStatus,
}

impl MockLineSource {
    /// Create a connected mock source and the handle that feeds it.
    pub fn new() -> (Self, MockLineSourceHandle) {
        let (line_tx, line_rx) = mpsc::channel(32);
        let status = DeviceStatus::new(MOCK_DEVICE_NAME, true);

        let source = Self {
            line_rx,
            status: status.clone(),
        };
        let handle = MockLineSourceHandle { line_tx, status };

        (source, handle)
    }
}

impl LineSource for MockLineSource {
    async fn next_line(&mut self) -> Result<String> {
        match self.line_rx.recv().await {
            Some(line) => Ok(line),
            None => {
                self.status.set_connected(false);
                Err(HardwareError::disconnected(MOCK_DEVICE_NAME))
            }
        }
    }

    fn status(&self) -> DeviceStatus {
        self.status.clone()
    }
}

/// Handle for feeding a [`MockLineSource`].
///
/// Dropping every clone of the handle ends the source.
#[derive(Debug, Clone)]
pub struct MockLineSourceHandle {
    line_tx: mpsc::Sender<String>,
    status: DeviceStatus,
}

impl MockLineSourceHandle {
    /// Deliver a line as if the device had sent it.
    ///
    /// # Errors
    ///
    /// Returns an error if the source has been dropped.
    pub async fn send_line(&self, line: impl Into<String>) -> Result<()> {
        self.line_tx
            .send(line.into())
            .await
            .map_err(|_| HardwareError::disconnected(MOCK_DEVICE_NAME))
    }

    /// Simulate the device being unplugged or plugged back in.
    pub fn set_connected(&self, connected: bool) {
        self.status.set_connected(connected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_in_order() {
        let (mut source, handle) = MockLineSource::new();
        handle.send_line("SYSTEM READY").await.unwrap();
        handle.send_line("UID:A").await.unwrap();

        assert_eq!(source.next_line().await.unwrap(), "SYSTEM READY");
        assert_eq!(source.next_line().await.unwrap(), "UID:A");
    }

    #[tokio::test]
    async fn test_dropped_handle_ends_source() {
        let (mut source, handle) = MockLineSource::new();
        let status = source.status();
        drop(handle);

        assert!(matches!(
            source.next_line().await,
            Err(HardwareError::Disconnected { .. })
        ));
        assert!(!status.is_connected());
    }

    #[tokio::test]
    async fn test_status_toggle() {
        let (source, handle) = MockLineSource::new();
        let status = source.status();
        assert!(status.is_connected());

        handle.set_connected(false);
        assert!(!status.is_connected());
    }

    #[tokio::test]
    async fn test_send_after_source_dropped() {
        let (source, handle) = MockLineSource::new();
        drop(source);
        assert!(handle.send_line("UID:A").await.is_err());
    }
}

//! Line source trait.
//!
//! A line source yields the trimmed, non-empty text lines reported by the
//! card reader. It uses native `async fn` (Edition 2024), so it is not
//! object-safe; see [`AnyLineSource`](crate::devices::AnyLineSource) for
//! runtime dispatch.

#![allow(async_fn_in_trait)]

use crate::Result;
use crate::types::DeviceStatus;

/// Producer of device lines.
///
/// Implementations own their reconnect policy: a transient loss of the
/// device does not surface here. An error means the source is finished and
/// will never yield again.
///
/// # Examples
///
/// ```
/// use cardbridge_hardware::{LineSource, MockLineSource};
///
/// #[tokio::main]
/// async fn main() -> cardbridge_hardware::Result<()> {
///     let (mut source, handle) = MockLineSource::new();
///     handle.send_line("UID:RF001234").await?;
///
///     assert_eq!(source.next_line().await?, "UID:RF001234");
///     Ok(())
/// }
/// ```
pub trait LineSource: Send {
    /// Wait for the next line.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Disconnected` once the source has stopped.
    async fn next_line(&mut self) -> Result<String>;

    /// Shared connection status of the underlying device.
    fn status(&self) -> DeviceStatus;
}

//! Enum wrapper for line source dispatch.
//!
//! [`LineSource`] uses native `async fn`, which rules out
//! `Box<dyn LineSource>`. The service picks a concrete source at startup and
//! stores it as an [`AnyLineSource`].

use crate::mock::MockLineSource;
use crate::serial::SerialLineSource;
use crate::types::DeviceStatus;
use crate::{LineSource, Result};

/// Runtime-selected line source.
///
/// # Examples
///
/// ```
/// use cardbridge_hardware::{AnyLineSource, LineSource, MockLineSource};
///
/// let (source, _handle) = MockLineSource::new();
/// let any = AnyLineSource::Mock(source);
/// assert!(any.status().is_connected());
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyLineSource {
    /// Serial port attached reader.
    Serial(SerialLineSource),
    /// Channel-fed source for tests and demos.
    Mock(MockLineSource),
}

impl LineSource for AnyLineSource {
    async fn next_line(&mut self) -> Result<String> {
        match self {
            Self::Serial(source) => source.next_line().await,
            Self::Mock(source) => source.next_line().await,
        }
    }

    fn status(&self) -> DeviceStatus {
        match self {
            Self::Serial(source) => source.status(),
            Self::Mock(source) => source.status(),
        }
    }
}

impl From<SerialLineSource> for AnyLineSource {
    fn from(source: SerialLineSource) -> Self {
        Self::Serial(source)
    }
}

impl From<MockLineSource> for AnyLineSource {
    fn from(source: MockLineSource) -> Self {
        Self::Mock(source)
    }
}

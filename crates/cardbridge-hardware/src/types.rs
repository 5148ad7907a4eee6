//! Shared device status.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable view of a device's connection state.
///
/// The reader side flips the flag; anyone holding a clone (the status
/// endpoint, for instance) can observe it without locking.
#[derive(Debug, Clone)]
pub struct DeviceStatus {
    device: Arc<str>,
    connected: Arc<AtomicBool>,
}

impl DeviceStatus {
    /// Create a status for the named device.
    pub fn new(device: impl Into<String>, connected: bool) -> Self {
        Self {
            device: Arc::from(device.into()),
            connected: Arc::new(AtomicBool::new(connected)),
        }
    }

    /// Device name or path.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns `true` while the device is open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let status = DeviceStatus::new("COM4", false);
        let view = status.clone();
        assert!(!view.is_connected());

        status.set_connected(true);
        assert!(view.is_connected());
        assert_eq!(view.device(), "COM4");
    }
}

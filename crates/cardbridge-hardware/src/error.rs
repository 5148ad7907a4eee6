//! Error types for line source operations.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while reading from the card reader device.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The device could not be opened.
    #[error("Device unavailable: {device}: {reason}")]
    Unavailable { device: String, reason: String },

    /// The line source stopped producing lines for good.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new unavailable error.
    pub fn unavailable(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            device: device.into(),
            reason: reason.into(),
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_error() {
        let error = HardwareError::unavailable("COM4", "No such file or directory");
        assert!(matches!(error, HardwareError::Unavailable { .. }));
        assert_eq!(
            error.to_string(),
            "Device unavailable: COM4: No such file or directory"
        );
    }

    #[test]
    fn test_disconnected_error() {
        let error = HardwareError::disconnected("/dev/ttyUSB0");
        assert_eq!(error.to_string(), "Device disconnected: /dev/ttyUSB0");
    }
}

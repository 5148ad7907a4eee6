//! Core constants for the card bridge.
//!
//! This module collects the serial line tokens emitted by the reader
//! firmware, the session timing rules, and the default values used by
//! [`BridgeConfig`](crate::BridgeConfig) when the environment does not
//! provide an override.
//!
//! # Serial Line Format
//!
//! The reader sends one event per newline-terminated line:
//!
//! ```text
//! SYSTEM READY
//! UID:RF001234
//! PIN:123456
//! PIN_CLEARED
//! ```
//!
//! # Usage
//!
//! ```
//! use cardbridge_core::constants::*;
//!
//! assert!("UID:RF001234".starts_with(LINE_PREFIX_UID));
//! assert_eq!(SESSION_TTL_SECS, 300);
//! ```

use std::net::{IpAddr, Ipv4Addr};

// ============================================================================
// Serial Line Tokens
// ============================================================================

/// Line sent once the reader firmware has finished booting.
pub const LINE_SYSTEM_READY: &str = "SYSTEM READY";

/// Prefix of a card scan line. The remainder is the opaque card token.
pub const LINE_PREFIX_UID: &str = "UID:";

/// Prefix of a completed PIN entry. The remainder is the entered digits.
pub const LINE_PREFIX_PIN: &str = "PIN:";

/// Line sent when the user clears the keypad buffer (`*` key).
pub const LINE_PIN_CLEARED: &str = "PIN_CLEARED";

/// Maximum accepted length of a single serial line in bytes.
///
/// The firmware never emits lines longer than a few dozen bytes; anything
/// bigger means the stream lost its newline framing.
pub const MAX_LINE_LENGTH: usize = 1024;

// ============================================================================
// Session Rules
// ============================================================================

/// Lifetime of a verified session in seconds.
///
/// A verified card/PIN pair older than this is treated as absent and can
/// no longer be used for payment.
pub const SESSION_TTL_SECS: u64 = 300;

/// PIN sent with the advisory existence check issued on card scan.
pub const CARD_CHECK_PIN: &str = "000000";

/// Message used when a card scan existence check fails.
pub const MSG_CARD_NOT_REGISTERED: &str = "Card is not registered";

/// Message used when the backend rejects a PIN without saying why.
pub const MSG_VERIFICATION_FAILED: &str = "Incorrect PIN";

/// Message sent with the device ready notification.
pub const MSG_DEVICE_READY: &str = "Arduino system ready";

// ============================================================================
// Defaults
// ============================================================================

/// Default serial device path.
pub const DEFAULT_SERIAL_PORT: &str = "COM4";

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default serial read timeout in milliseconds.
pub const DEFAULT_SERIAL_TIMEOUT_MS: u64 = 1000;

/// Default backend base URL (the `/rfid/...` paths are appended).
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001/api";

/// Default backend request timeout in milliseconds.
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 10_000;

/// Default bind address of the real-time server.
pub const DEFAULT_WS_BIND: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Default port of the real-time server.
pub const DEFAULT_WS_PORT: u16 = 8765;

/// Default payment description when the caller provides none.
pub const DEFAULT_PAYMENT_DESCRIPTION: &str = "POS Payment";

/// Initial delay before reopening a lost serial device.
pub const RECONNECT_INITIAL_BACKOFF_MS: u64 = 500;

/// Upper bound for the serial reconnect backoff.
pub const RECONNECT_MAX_BACKOFF_MS: u64 = 30_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_tokens_are_distinct() {
        let tokens = [
            LINE_SYSTEM_READY,
            LINE_PREFIX_UID,
            LINE_PREFIX_PIN,
            LINE_PIN_CLEARED,
        ];
        for (i, a) in tokens.iter().enumerate() {
            for b in tokens.iter().skip(i + 1) {
                assert!(!a.starts_with(b) && !b.starts_with(a));
            }
        }
    }

    #[test]
    fn test_backoff_bounds() {
        assert!(RECONNECT_INITIAL_BACKOFF_MS < RECONNECT_MAX_BACKOFF_MS);
    }
}

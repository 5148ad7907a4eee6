//! Classification of serial lines into device events.
//!
//! The reader firmware speaks a tiny line protocol. Every line maps to
//! exactly one [`DeviceEvent`]; lines that match no known token become
//! [`DeviceEvent::Unknown`] instead of an error, so [`parse`] is total.
//!
//! # Example
//!
//! ```
//! use cardbridge_protocol::{DeviceEvent, parse};
//!
//! assert_eq!(parse("SYSTEM READY"), DeviceEvent::Ready);
//! assert!(matches!(parse("UID:RF001234"), DeviceEvent::CardScanned { .. }));
//! assert!(matches!(parse("hello"), DeviceEvent::Unknown { .. }));
//! ```

use cardbridge_core::constants::{
    LINE_PIN_CLEARED, LINE_PREFIX_PIN, LINE_PREFIX_UID, LINE_SYSTEM_READY,
};
use cardbridge_core::{CardId, Pin};

/// Event reported by the card reader / keypad device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Firmware finished booting (`SYSTEM READY`).
    Ready,

    /// A card was presented (`UID:<token>`).
    CardScanned { id: CardId },

    /// The user confirmed a PIN on the keypad (`PIN:<digits>`).
    PinComplete { pin: Pin },

    /// The user cleared the keypad buffer (`PIN_CLEARED`).
    PinCleared,

    /// Any other line, kept verbatim for diagnostics.
    Unknown { raw: String },
}

impl DeviceEvent {
    /// Short lowercase name, used for logging and the reading log.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceEvent::Ready => "ready",
            DeviceEvent::CardScanned { .. } => "card_scanned",
            DeviceEvent::PinComplete { .. } => "pin_complete",
            DeviceEvent::PinCleared => "pin_cleared",
            DeviceEvent::Unknown { .. } => "unknown",
        }
    }

    /// Card id carried by the event, if any.
    #[must_use]
    pub fn card_id(&self) -> Option<&CardId> {
        match self {
            DeviceEvent::CardScanned { id } => Some(id),
            _ => None,
        }
    }

    /// The line this event was parsed from, with any PIN masked.
    #[must_use]
    pub fn redacted_line(&self) -> String {
        match self {
            DeviceEvent::Ready => LINE_SYSTEM_READY.to_string(),
            DeviceEvent::CardScanned { id } => format!("{LINE_PREFIX_UID}{id}"),
            DeviceEvent::PinComplete { pin } => format!("{LINE_PREFIX_PIN}{}", pin.masked()),
            DeviceEvent::PinCleared => LINE_PIN_CLEARED.to_string(),
            DeviceEvent::Unknown { raw } => raw.clone(),
        }
    }
}

/// Classify one serial line.
///
/// The line is expected to be trimmed already (see
/// [`SerialLineCodec`](crate::SerialLineCodec)). Exact tokens are compared
/// first, then prefixes; the remainder after a prefix is taken verbatim.
#[must_use]
pub fn parse(line: &str) -> DeviceEvent {
    if line == LINE_SYSTEM_READY {
        return DeviceEvent::Ready;
    }
    if line == LINE_PIN_CLEARED {
        return DeviceEvent::PinCleared;
    }
    if let Some(id) = line.strip_prefix(LINE_PREFIX_UID) {
        return DeviceEvent::CardScanned { id: CardId::new(id) };
    }
    if let Some(pin) = line.strip_prefix(LINE_PREFIX_PIN) {
        return DeviceEvent::PinComplete { pin: Pin::new(pin) };
    }
    DeviceEvent::Unknown {
        raw: line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("SYSTEM READY", "SYSTEM READY")]
    #[case("UID:RF001234", "UID:RF001234")]
    #[case("PIN:123456", "PIN:******")]
    #[case("PIN_CLEARED", "PIN_CLEARED")]
    #[case("garbage", "garbage")]
    fn test_redacted_line(#[case] line: &str, #[case] expected: &str) {
        assert_eq!(parse(line).redacted_line(), expected);
    }

    #[test]
    fn test_ready() {
        assert_eq!(parse("SYSTEM READY"), DeviceEvent::Ready);
    }

    #[test]
    fn test_pin_cleared() {
        assert_eq!(parse("PIN_CLEARED"), DeviceEvent::PinCleared);
    }

    #[rstest]
    #[case("UID:RF001234", "RF001234")]
    #[case("UID:04 A3 1B 7C", "04 A3 1B 7C")]
    #[case("UID:", "")]
    #[case("UID:UID:x", "UID:x")]
    fn test_card_scanned(#[case] line: &str, #[case] expected: &str) {
        assert_eq!(
            parse(line),
            DeviceEvent::CardScanned {
                id: CardId::new(expected)
            }
        );
    }

    #[rstest]
    #[case("PIN:123456", "123456")]
    #[case("PIN:1", "1")]
    #[case("PIN:", "")]
    fn test_pin_complete(#[case] line: &str, #[case] expected: &str) {
        match parse(line) {
            DeviceEvent::PinComplete { pin } => assert_eq!(pin.expose(), expected),
            other => panic!("expected PinComplete, got {other:?}"),
        }
    }

    #[rstest]
    #[case("system ready")]
    #[case("SYSTEM READY!")]
    #[case("PIN_CLEARED_X")]
    #[case("uid:RF001234")]
    #[case("Keypad: 5")]
    fn test_unknown(#[case] line: &str) {
        assert_eq!(
            parse(line),
            DeviceEvent::Unknown {
                raw: line.to_string()
            }
        );
    }

    #[test]
    fn test_kind_and_card_id() {
        let event = parse("UID:RF001234");
        assert_eq!(event.kind(), "card_scanned");
        assert_eq!(event.card_id().map(CardId::as_str), Some("RF001234"));
        assert_eq!(parse("PIN:1").card_id(), None);
    }
}

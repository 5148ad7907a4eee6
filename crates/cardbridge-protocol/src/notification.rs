//! Real-time notifications published to subscribers.
//!
//! Every notification is a flat JSON object with a snake_case `type`
//! discriminator, camelCase fields and an RFC 3339 UTC `timestamp`:
//!
//! ```json
//! {"type":"card_scanned","cardId":"RF001234","timestamp":"2025-10-16T09:12:44.120Z"}
//! {"type":"pin_entered","cardId":"RF001234","pinLength":6,"timestamp":"..."}
//! {"type":"payment_processed","success":true,"data":{"newBalance":9000},"message":"","timestamp":"..."}
//! ```
//!
//! [`NotificationKind::Warning`] and [`NotificationKind::Diagnostic`] are
//! local only: the bridge logs them but never forwards them to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cardbridge_core::CardId;

/// Payload of a notification, tagged by its wire `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum NotificationKind {
    /// A card was presented to the reader.
    CardScanned { card_id: CardId },

    /// The advisory existence check found the card.
    CardVerified { card_id: CardId, card_data: Value },

    /// The advisory existence check did not find the card.
    CardError { card_id: CardId, message: String },

    /// A PIN was entered and is being verified. Only its length is sent.
    PinEntered { card_id: CardId, pin_length: usize },

    /// The keypad buffer was cleared. `cardId` is `null` without a card.
    PinCleared { card_id: Option<CardId> },

    /// Card and PIN were accepted by the backend.
    VerificationSuccess { card_id: CardId, card_data: Value },

    /// Card and PIN were rejected, or the backend could not be reached.
    VerificationFailed { card_id: CardId, message: String },

    /// Outcome of a payment request.
    PaymentProcessed {
        success: bool,
        #[serde(default)]
        data: Value,
        #[serde(default)]
        message: String,
    },

    /// The reader firmware reported it is ready.
    #[serde(rename = "arduino_ready")]
    DeviceReady { message: String },

    /// Local anomaly worth an operator's attention.
    Warning { message: String },

    /// Unrecognized serial line.
    Diagnostic { raw: String },
}

/// A timestamped notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(flatten)]
    pub kind: NotificationKind,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Stamp a payload with the current time.
    pub fn new(kind: NotificationKind) -> Self {
        Self::at(kind, Utc::now())
    }

    /// Stamp a payload with an explicit time.
    pub fn at(kind: NotificationKind, timestamp: DateTime<Utc>) -> Self {
        Self { kind, timestamp }
    }

    /// Wire `type` of this notification.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            NotificationKind::CardScanned { .. } => "card_scanned",
            NotificationKind::CardVerified { .. } => "card_verified",
            NotificationKind::CardError { .. } => "card_error",
            NotificationKind::PinEntered { .. } => "pin_entered",
            NotificationKind::PinCleared { .. } => "pin_cleared",
            NotificationKind::VerificationSuccess { .. } => "verification_success",
            NotificationKind::VerificationFailed { .. } => "verification_failed",
            NotificationKind::PaymentProcessed { .. } => "payment_processed",
            NotificationKind::DeviceReady { .. } => "arduino_ready",
            NotificationKind::Warning { .. } => "warning",
            NotificationKind::Diagnostic { .. } => "diagnostic",
        }
    }

    /// Returns `true` if subscribers should receive this notification.
    #[must_use]
    pub fn is_forwarded(&self) -> bool {
        !matches!(
            self.kind,
            NotificationKind::Warning { .. } | NotificationKind::Diagnostic { .. }
        )
    }

    /// Card id the notification refers to, if any.
    #[must_use]
    pub fn card_id(&self) -> Option<&CardId> {
        match &self.kind {
            NotificationKind::CardScanned { card_id }
            | NotificationKind::CardVerified { card_id, .. }
            | NotificationKind::CardError { card_id, .. }
            | NotificationKind::PinEntered { card_id, .. }
            | NotificationKind::VerificationSuccess { card_id, .. }
            | NotificationKind::VerificationFailed { card_id, .. } => Some(card_id),
            NotificationKind::PinCleared { card_id } => card_id.as_ref(),
            _ => None,
        }
    }

    /// Serialize to the JSON text sent in a WebSocket frame.
    ///
    /// # Errors
    /// Returns the serializer error; it cannot occur for payloads built from
    /// backend JSON, but the signature keeps callers honest.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<NotificationKind> for Notification {
    fn from(kind: NotificationKind) -> Self {
        Notification::new(kind)
    }
}

/// Message received from a real-time client.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// A notification pushed by a client, to be relayed to everyone.
    Relay(Notification),

    /// A request to charge the verified card.
    ProcessPayment {
        amount: u64,
        description: Option<String>,
    },
}

#[derive(Deserialize)]
struct ProcessPaymentCommand {
    amount: u64,
    #[serde(default)]
    description: Option<String>,
}

impl InboundMessage {
    /// Classify a text frame.
    ///
    /// Returns `None` for anything that is neither a `process_payment`
    /// command nor a forwardable notification.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;

        if value.get("type").and_then(Value::as_str) == Some("process_payment") {
            let command: ProcessPaymentCommand = serde_json::from_value(value).ok()?;
            return Some(InboundMessage::ProcessPayment {
                amount: command.amount,
                description: command.description,
            });
        }

        let notification: Notification = serde_json::from_value(value).ok()?;
        notification
            .is_forwarded()
            .then_some(InboundMessage::Relay(notification))
    }
}

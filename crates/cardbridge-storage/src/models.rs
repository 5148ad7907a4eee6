//! Rows of the reading log.

use chrono::{DateTime, Utc};
use serde::Serialize;

use cardbridge_core::{Amount, CardId};
use cardbridge_protocol::DeviceEvent;

/// One stored serial line.
///
/// `line` is the redacted form: PIN digits are replaced by `*`.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Reading {
    pub id: i64,
    pub line: String,
    pub event_kind: String,
    pub card_id: Option<String>,
    pub read_at: DateTime<Utc>,
}

/// A reading about to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub line: String,
    pub event_kind: &'static str,
    pub card_id: Option<CardId>,
    pub read_at: DateTime<Utc>,
}

impl NewReading {
    /// Build the row for a parsed device event.
    ///
    /// `card_id` is the card the event belongs to: the scanned card for
    /// `UID:` lines, the session card for keypad lines.
    pub fn from_event(event: &DeviceEvent, card_id: Option<&CardId>, read_at: DateTime<Utc>) -> Self {
        Self {
            line: event.redacted_line(),
            event_kind: event.kind(),
            card_id: event.card_id().or(card_id).cloned(),
            read_at,
        }
    }
}

/// One stored payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PaymentRecord {
    pub id: i64,
    pub card_id: Option<String>,
    pub amount: i64,
    pub description: String,
    pub success: bool,
    pub message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// A payment attempt about to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    /// `None` when the attempt failed before a session was found.
    pub card_id: Option<CardId>,
    pub amount: Amount,
    pub description: String,
    pub success: bool,
    pub message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

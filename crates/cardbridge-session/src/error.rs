use cardbridge_protocol::{Notification, NotificationKind};
use serde_json::Value;
use thiserror::Error;

/// Why a payment could not be started.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentError {
    /// No card has been verified, or the last session was already used.
    #[error("No verified session")]
    NoSession,

    /// The verified session outlived its TTL and has been cleared.
    #[error("Session expired")]
    SessionExpired,
}

impl PaymentError {
    /// `payment_processed` failure notification describing this error.
    pub fn to_notification(self) -> Notification {
        Notification::new(NotificationKind::PaymentProcessed {
            success: false,
            data: Value::Object(Default::default()),
            message: self.to_string(),
        })
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;

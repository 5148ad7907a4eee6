//! Session states and transition records.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Phase of the card/PIN transaction.
///
/// # Valid Transitions
///
/// ```text
/// Idle --scan--> WaitingPin --scan--> WaitingPin
///                WaitingPin --PIN---> Processing --verify done--> Idle
/// any --reset--> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No transaction in progress. A verified session may still be open.
    Idle,

    /// A card was scanned; waiting for the PIN.
    WaitingPin,

    /// Card and PIN are being verified by the backend.
    Processing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::WaitingPin => "WaitingPin",
            SessionState::Processing => "Processing",
        };
        write!(f, "{}", name)
    }
}

impl SessionState {
    /// Check if a regular transition to `target` is allowed.
    ///
    /// Resets to `Idle` bypass this check.
    ///
    /// ```
    /// use cardbridge_session::SessionState;
    ///
    /// assert!(SessionState::Idle.can_transition_to(&SessionState::WaitingPin));
    /// assert!(!SessionState::Idle.can_transition_to(&SessionState::Processing));
    /// ```
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::WaitingPin)
                | (SessionState::WaitingPin, SessionState::WaitingPin)
                | (SessionState::WaitingPin, SessionState::Processing)
                | (SessionState::Processing, SessionState::Idle)
        )
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub at: Instant,
}

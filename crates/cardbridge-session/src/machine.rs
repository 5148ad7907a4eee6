//! Card/PIN session state machine.
//!
//! The machine is pure: it never performs I/O and never reads the clock.
//! Callers pass the current [`Instant`], feed device events and backend
//! results in, and act on what comes out:
//!
//! ```text
//! DeviceEvent --apply()--> [Step { notification, request? }]
//! request ----(caller runs it)----> ApiResponse --complete_*()--> notification
//! prepare_payment() -> PaymentTicket --(caller pays)--> finish_payment()
//! ```
//!
//! # Event Table
//!
//! | State      | Event          | Output                                  | Next       |
//! |------------|----------------|-----------------------------------------|------------|
//! | Idle       | CardScanned    | `card_scanned` + existence check        | WaitingPin |
//! | WaitingPin | CardScanned    | `card_scanned` + existence check        | WaitingPin |
//! | WaitingPin | PinComplete    | `pin_entered` + verify                  | Processing |
//! | Idle       | PinComplete    | warning                                 | Idle       |
//! | Processing | PinComplete    | warning                                 | Processing |
//! | Processing | CardScanned    | warning                                 | Processing |
//! | any        | PinCleared     | `pin_cleared`                           | unchanged  |
//! | any        | Ready          | `arduino_ready`                         | unchanged  |
//! | any        | Unknown        | diagnostic                              | unchanged  |
//!
//! # Verified Session
//!
//! A successful verification opens a verified session holding the card, its
//! credential and the backend card data. It can pay until the TTL runs out,
//! a payment succeeds, or another card is scanned. The entry PIN held while
//! `Processing` is cleared either way, so no PIN is ever held while `Idle`
//! outside the verified session.
//!
//! # Examples
//!
//! ```
//! use std::time::Instant;
//! use cardbridge_core::ApiResponse;
//! use cardbridge_protocol::parse;
//! use cardbridge_session::{BackendRequest, SessionState, SessionStateMachine};
//! use serde_json::json;
//!
//! let mut machine = SessionStateMachine::new();
//! let now = Instant::now();
//!
//! let steps = machine.apply(parse("UID:RF001234"), now);
//! assert_eq!(steps[0].notification.type_name(), "card_scanned");
//! assert!(matches!(steps[0].request, Some(BackendRequest::CheckCard { .. })));
//!
//! machine.apply(parse("PIN:123456"), now);
//! assert_eq!(machine.state(), SessionState::Processing);
//!
//! let card = machine.card_id().cloned().unwrap();
//! let done = machine.complete_verify(&card, ApiResponse::ok(json!({"balance": 10000})), now);
//! assert_eq!(done.unwrap().type_name(), "verification_success");
//! assert!(machine.verified().is_some());
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use cardbridge_core::constants::{
    CARD_CHECK_PIN, MSG_CARD_NOT_REGISTERED, MSG_DEVICE_READY, MSG_VERIFICATION_FAILED,
    SESSION_TTL_SECS,
};
use cardbridge_core::{Amount, ApiResponse, CardId, Pin};
use cardbridge_protocol::{DeviceEvent, Notification, NotificationKind};

use crate::error::{PaymentError, Result};
use crate::state::{SessionState, StateTransition};

/// Maximum number of state transitions kept for diagnostics.
const MAX_HISTORY_SIZE: usize = 100;

/// Backend call the caller must run on behalf of the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRequest {
    /// Advisory existence check issued on scan, using a dummy PIN.
    CheckCard { card_id: CardId },

    /// Verification of the entered PIN.
    Verify { card_id: CardId, pin: Pin },
}

impl BackendRequest {
    /// Card the request is about.
    pub fn card_id(&self) -> &CardId {
        match self {
            BackendRequest::CheckCard { card_id } | BackendRequest::Verify { card_id, .. } => {
                card_id
            }
        }
    }

    /// PIN to send to the backend.
    pub fn pin(&self) -> Pin {
        match self {
            BackendRequest::CheckCard { .. } => Pin::new(CARD_CHECK_PIN),
            BackendRequest::Verify { pin, .. } => pin.clone(),
        }
    }
}

/// One output of [`SessionStateMachine::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub notification: Notification,
    pub request: Option<BackendRequest>,
}

impl Step {
    fn notify(kind: NotificationKind) -> Self {
        Self {
            notification: Notification::new(kind),
            request: None,
        }
    }

    fn with_request(kind: NotificationKind, request: BackendRequest) -> Self {
        Self {
            notification: Notification::new(kind),
            request: Some(request),
        }
    }
}

/// A card and credential accepted by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedSession {
    pub card_id: CardId,
    pub pin: Pin,
    pub card_data: Value,
    pub verified_at: Instant,
}

/// Everything needed to run one payment against the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentTicket {
    pub card_id: CardId,
    pub pin: Pin,
    pub amount: Amount,
    pub description: String,
    verified_at: Instant,
}

/// Serializable view of the session for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub card_id: Option<CardId>,
    pub verified: bool,
    pub verified_card_id: Option<CardId>,
    pub expires_in_secs: Option<u64>,
}

/// The single transaction context of the bridge.
///
/// # Thread Safety
///
/// Not synchronized. The bridge service owns it inside one actor task.
#[derive(Debug)]
pub struct SessionStateMachine {
    state: SessionState,
    card_id: Option<CardId>,
    pin: Option<Pin>,
    verified: Option<VerifiedSession>,
    ttl: Duration,
    history: VecDeque<StateTransition>,
    history_capacity: usize,
}

impl SessionStateMachine {
    /// Create an idle machine with the default TTL.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for a machine with custom settings.
    ///
    /// ```
    /// use std::time::Duration;
    /// use cardbridge_session::SessionStateMachine;
    ///
    /// let machine = SessionStateMachine::builder()
    ///     .with_ttl(Duration::from_secs(60))
    ///     .build();
    /// assert_eq!(machine.ttl(), Duration::from_secs(60));
    /// ```
    pub fn builder() -> SessionStateMachineBuilder {
        SessionStateMachineBuilder::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Card of the transaction in progress (or of the verified session).
    pub fn card_id(&self) -> Option<&CardId> {
        self.card_id.as_ref()
    }

    /// Entry PIN being verified. Only set while `Processing`.
    pub fn pin(&self) -> Option<&Pin> {
        self.pin.as_ref()
    }

    /// Open verified session, expired or not.
    pub fn verified(&self) -> Option<&VerifiedSession> {
        self.verified.as_ref()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Status view at `now`. An expired verified session reports as absent.
    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        let live = self
            .verified
            .as_ref()
            .filter(|v| !self.is_expired(v, now));

        SessionSnapshot {
            state: self.state,
            card_id: self.card_id.clone(),
            verified: live.is_some(),
            verified_card_id: live.map(|v| v.card_id.clone()),
            expires_in_secs: live.map(|v| {
                self.ttl
                    .saturating_sub(now.saturating_duration_since(v.verified_at))
                    .as_secs()
            }),
        }
    }

    /// Apply one device event.
    ///
    /// Returns the notifications to publish, in order, each with the backend
    /// call to issue after publishing it, if any.
    pub fn apply(&mut self, event: DeviceEvent, now: Instant) -> Vec<Step> {
        match event {
            DeviceEvent::Ready => vec![Step::notify(NotificationKind::DeviceReady {
                message: MSG_DEVICE_READY.to_string(),
            })],
            DeviceEvent::CardScanned { id } => self.on_card_scanned(id, now),
            DeviceEvent::PinComplete { pin } => self.on_pin_complete(pin, now),
            DeviceEvent::PinCleared => vec![Step::notify(NotificationKind::PinCleared {
                card_id: self.card_id.clone(),
            })],
            DeviceEvent::Unknown { raw } => {
                vec![Step::notify(NotificationKind::Diagnostic { raw })]
            }
        }
    }

    fn on_card_scanned(&mut self, id: CardId, now: Instant) -> Vec<Step> {
        match self.state {
            SessionState::Idle | SessionState::WaitingPin => {
                if let Some(previous) = self.verified.take() {
                    info!(card_id = %previous.card_id, "Verified session discarded by new scan");
                }
                if self.state == SessionState::WaitingPin {
                    debug!(card_id = %id, "Card replaced while waiting for PIN");
                }

                self.card_id = Some(id.clone());
                self.enter(SessionState::WaitingPin, now);

                vec![Step::with_request(
                    NotificationKind::CardScanned {
                        card_id: id.clone(),
                    },
                    BackendRequest::CheckCard { card_id: id },
                )]
            }
            SessionState::Processing => {
                warn!(card_id = %id, "Card scanned while a verification is in progress");
                vec![Step::notify(NotificationKind::Warning {
                    message: format!("Card {id} scanned during verification, ignored"),
                })]
            }
        }
    }

    fn on_pin_complete(&mut self, pin: Pin, now: Instant) -> Vec<Step> {
        match (self.state, self.card_id.clone()) {
            (SessionState::WaitingPin, Some(card_id)) => {
                let pin_length = pin.len();
                self.pin = Some(pin.clone());
                self.enter(SessionState::Processing, now);

                vec![Step::with_request(
                    NotificationKind::PinEntered {
                        card_id: card_id.clone(),
                        pin_length,
                    },
                    BackendRequest::Verify { card_id, pin },
                )]
            }
            (SessionState::Processing, _) => {
                warn!(pin = %pin, "PIN entered while a verification is in progress");
                vec![Step::notify(NotificationKind::Warning {
                    message: "PIN entered during verification, ignored".to_string(),
                })]
            }
            _ => {
                warn!(pin = %pin, "PIN entered but no card scanned");
                vec![Step::notify(NotificationKind::Warning {
                    message: "PIN entered but no card scanned".to_string(),
                })]
            }
        }
    }

    /// Apply the result of an existence check issued for `card_id`.
    ///
    /// Returns `None` when the result is stale: the card was replaced, or
    /// the session already left `WaitingPin`.
    pub fn complete_check(&mut self, card_id: &CardId, response: ApiResponse) -> Option<Notification> {
        if self.state != SessionState::WaitingPin || self.card_id.as_ref() != Some(card_id) {
            debug!(card_id = %card_id, "Discarding stale card check result");
            return None;
        }

        let kind = if response.success {
            NotificationKind::CardVerified {
                card_id: card_id.clone(),
                card_data: response.data_or_empty(),
            }
        } else {
            NotificationKind::CardError {
                card_id: card_id.clone(),
                message: MSG_CARD_NOT_REGISTERED.to_string(),
            }
        };
        Some(Notification::new(kind))
    }

    /// Apply the result of a PIN verification issued for `card_id`.
    ///
    /// Success opens the verified session and returns to `Idle`; failure
    /// resets the whole session. Returns `None` for a stale result.
    pub fn complete_verify(
        &mut self,
        card_id: &CardId,
        response: ApiResponse,
        now: Instant,
    ) -> Option<Notification> {
        if self.state != SessionState::Processing || self.card_id.as_ref() != Some(card_id) {
            debug!(card_id = %card_id, "Discarding stale verification result");
            return None;
        }

        let kind = if response.success {
            let card_data = response.data_or_empty();
            let pin = self.pin.take().unwrap_or_else(|| Pin::new(""));
            self.verified = Some(VerifiedSession {
                card_id: card_id.clone(),
                pin,
                card_data: card_data.clone(),
                verified_at: now,
            });
            self.enter(SessionState::Idle, now);
            info!(card_id = %card_id, "Card and PIN verified");

            NotificationKind::VerificationSuccess {
                card_id: card_id.clone(),
                card_data,
            }
        } else {
            self.reset(now);
            let message = response
                .message
                .unwrap_or_else(|| MSG_VERIFICATION_FAILED.to_string());
            warn!(card_id = %card_id, reason = %message, "Card/PIN verification failed");

            NotificationKind::VerificationFailed {
                card_id: card_id.clone(),
                message,
            }
        };
        Some(Notification::new(kind))
    }

    /// Check the payment precondition and hand out a ticket.
    ///
    /// # Errors
    ///
    /// - `PaymentError::NoSession` if nothing is verified.
    /// - `PaymentError::SessionExpired` if the verified session is older
    ///   than the TTL; the stale session is cleared.
    pub fn prepare_payment(
        &mut self,
        amount: Amount,
        description: impl Into<String>,
        now: Instant,
    ) -> Result<PaymentTicket> {
        let verified = self.verified.as_ref().ok_or(PaymentError::NoSession)?;

        if self.is_expired(verified, now) {
            info!(card_id = %verified.card_id, "Verified session expired");
            self.reset(now);
            return Err(PaymentError::SessionExpired);
        }

        Ok(PaymentTicket {
            card_id: verified.card_id.clone(),
            pin: verified.pin.clone(),
            amount,
            description: description.into(),
            verified_at: verified.verified_at,
        })
    }

    /// Apply the backend's answer to a payment.
    ///
    /// Success closes the verified session the ticket came from; failure
    /// keeps it so the payment can be retried until the TTL runs out.
    pub fn finish_payment(
        &mut self,
        ticket: &PaymentTicket,
        response: &ApiResponse,
        now: Instant,
    ) -> Notification {
        if response.success {
            let same_session = self.verified.as_ref().is_some_and(|v| {
                v.card_id == ticket.card_id && v.verified_at == ticket.verified_at
            });
            if same_session {
                self.reset(now);
            }
            info!(card_id = %ticket.card_id, amount = %ticket.amount, "Payment processed");
        } else {
            warn!(
                card_id = %ticket.card_id,
                amount = %ticket.amount,
                reason = response.message.as_deref().unwrap_or(""),
                "Payment rejected"
            );
        }

        Notification::new(NotificationKind::PaymentProcessed {
            success: response.success,
            data: response.data_or_empty(),
            message: response.message.clone().unwrap_or_default(),
        })
    }

    /// Return to `Idle`, clearing card, PIN and verified session together.
    pub fn reset(&mut self, now: Instant) {
        self.card_id = None;
        self.pin = None;
        self.verified = None;
        self.record(self.state, SessionState::Idle, now);
        self.state = SessionState::Idle;
    }

    fn is_expired(&self, verified: &VerifiedSession, now: Instant) -> bool {
        now.saturating_duration_since(verified.verified_at) > self.ttl
    }

    fn enter(&mut self, next: SessionState, now: Instant) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Session transition");
        self.record(self.state, next, now);
        self.state = next;
    }

    fn record(&mut self, from: SessionState, to: SessionState, at: Instant) {
        self.history.push_back(StateTransition { from, to, at });
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`SessionStateMachine`].
#[derive(Debug)]
pub struct SessionStateMachineBuilder {
    ttl: Duration,
    history_capacity: usize,
}

impl SessionStateMachineBuilder {
    /// Set the verified-session TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set how many transitions are kept in history.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn build(self) -> SessionStateMachine {
        SessionStateMachine {
            state: SessionState::Idle,
            card_id: None,
            pin: None,
            verified: None,
            ttl: self.ttl,
            history: VecDeque::with_capacity(self.history_capacity.min(MAX_HISTORY_SIZE)),
            history_capacity: self.history_capacity,
        }
    }
}

impl Default for SessionStateMachineBuilder {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(SESSION_TTL_SECS),
            history_capacity: MAX_HISTORY_SIZE,
        }
    }
}

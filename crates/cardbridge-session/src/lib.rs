//! Session state machine of the card bridge.
//!
//! Turns device events into the card/PIN transaction, decides which backend
//! calls to make, and produces the notifications subscribers see. See
//! [`machine`] for the event table.

pub mod error;
pub mod machine;
pub mod state;

pub use error::{PaymentError, Result};
pub use machine::{
    BackendRequest, PaymentTicket, SessionSnapshot, SessionStateMachine,
    SessionStateMachineBuilder, Step, VerifiedSession,
};
pub use state::{SessionState, StateTransition};

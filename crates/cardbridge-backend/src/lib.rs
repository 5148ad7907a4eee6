//! Client for the card verification and payment API.

pub mod client;
pub mod error;
pub mod mock;
pub mod types;

pub use client::{BackendClient, HEALTH_PATH, HttpBackendClient, PAYMENT_PATH, VERIFY_PATH};
pub use error::{BackendError, Result};
pub use mock::{BackendCall, MockBackend};
pub use types::{CardInfo, PaymentReceipt, PaymentRequest, VerifyRequest};

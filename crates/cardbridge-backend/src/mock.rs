//! Scripted backend for tests and demos.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cardbridge_core::{ApiResponse, CardId, Pin};

use crate::client::BackendClient;
use crate::types::PaymentRequest;

/// A call received by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Verify { card_id: CardId, pin: Pin },
    Pay(PaymentRequest),
}

#[derive(Debug, Default)]
struct Script {
    verify: VecDeque<ApiResponse>,
    pay: VecDeque<ApiResponse>,
    calls: Vec<BackendCall>,
}

/// Backend that answers from queues of canned responses.
///
/// When a queue runs dry the call fails with a "no scripted response"
/// message. Clones share the same script.
///
/// ```
/// use cardbridge_backend::{BackendClient, MockBackend};
/// use cardbridge_core::{ApiResponse, CardId, Pin};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MockBackend::new();
/// backend.push_verify(ApiResponse::ok(json!({"balance": 10000})));
///
/// let response = backend.verify(&CardId::new("RF001234"), &Pin::new("123456")).await;
/// assert!(response.success);
/// assert_eq!(backend.calls().len(), 1);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every answer, to hold requests in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue the answer to the next verify call.
    pub fn push_verify(&self, response: ApiResponse) {
        self.lock().verify.push_back(response);
    }

    /// Queue the answer to the next payment call.
    pub fn push_payment(&self, response: ApiResponse) {
        self.lock().pay.push_back(response);
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn unscripted() -> ApiResponse {
    ApiResponse::failure("no scripted response")
}

impl BackendClient for MockBackend {
    async fn verify(&self, card_id: &CardId, pin: &Pin) -> ApiResponse {
        let response = {
            let mut script = self.lock();
            script.calls.push(BackendCall::Verify {
                card_id: card_id.clone(),
                pin: pin.clone(),
            });
            script.verify.pop_front().unwrap_or_else(unscripted)
        };
        self.pause().await;
        response
    }

    async fn pay(&self, request: &PaymentRequest) -> ApiResponse {
        let response = {
            let mut script = self.lock();
            script.calls.push(BackendCall::Pay(request.clone()));
            script.pay.pop_front().unwrap_or_else(unscripted)
        };
        self.pause().await;
        response
    }
}

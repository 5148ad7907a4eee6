//! Backend API client.
//!
//! ```text
//! POST {base}/rfid/verify   {cardId, pin}                       -> envelope
//! POST {base}/rfid/payment  {cardId, pin, amount, description}  -> envelope
//! GET  {base}/rfid/test                                          -> 2xx when up
//! ```
//!
//! The backend answers with `{success, data?, message?}`, also on 4xx/5xx
//! (wrong PIN is a 401 with a message). Such envelopes are returned as-is,
//! with `success` forced to `false` for non-2xx statuses. Anything else
//! (transport failure, non-JSON error page) becomes a failed envelope whose
//! message describes the cause, so callers never handle errors here.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use cardbridge_core::{ApiResponse, BridgeConfig, CardId, Pin};

use crate::error::{BackendError, Result};
use crate::types::{PaymentRequest, VerifyRequest};

pub const VERIFY_PATH: &str = "/rfid/verify";
pub const PAYMENT_PATH: &str = "/rfid/payment";
pub const HEALTH_PATH: &str = "/rfid/test";

/// Verification and payment calls used by the bridge.
///
/// Both calls are total: every failure is folded into a failed
/// [`ApiResponse`].
pub trait BackendClient: Send + Sync + 'static {
    /// Verify a card and PIN.
    fn verify(&self, card_id: &CardId, pin: &Pin) -> impl Future<Output = ApiResponse> + Send;

    /// Charge a verified card.
    fn pay(&self, request: &PaymentRequest) -> impl Future<Output = ApiResponse> + Send;
}

/// [`BackendClient`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpBackendClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackendClient {
    /// Create a client for `base_url` (e.g. `http://localhost:3001/api`).
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Setup` if the TLS backend cannot be initialized.
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cardbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Create a client from the bridge configuration.
    ///
    /// # Errors
    ///
    /// Same as [`HttpBackendClient::new`].
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        Self::new(
            config.api_base_url.clone(),
            config.api_token.clone(),
            config.backend_timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the backend is reachable and answering.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unreachable` on transport failure and
    /// `BackendError::Rejected` for a non-2xx status.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let status = request.send().await?.status();
        debug!(url = %url, status = status.as_u16(), "Backend health check");

        if status.is_success() {
            Ok(())
        } else {
            Err(BackendError::Rejected {
                status: status.as_u16(),
            })
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        debug!(url = %url, status = status.as_u16(), "Backend responded");

        match serde_json::from_str::<ApiResponse>(&text) {
            Ok(mut envelope) => {
                if !status.is_success() {
                    envelope.success = false;
                }
                Ok(envelope)
            }
            Err(e) if status.is_success() => Err(BackendError::invalid_response(e.to_string())),
            Err(_) => Err(BackendError::Rejected {
                status: status.as_u16(),
            }),
        }
    }
}

impl BackendClient for HttpBackendClient {
    async fn verify(&self, card_id: &CardId, pin: &Pin) -> ApiResponse {
        let body = VerifyRequest { card_id, pin };
        self.post(VERIFY_PATH, &body).await.unwrap_or_else(|e| {
            warn!(card_id = %card_id, error = %e, "Verify request failed");
            e.into_response()
        })
    }

    async fn pay(&self, request: &PaymentRequest) -> ApiResponse {
        self.post(PAYMENT_PATH, request).await.unwrap_or_else(|e| {
            warn!(card_id = %request.card_id, error = %e, "Payment request failed");
            e.into_response()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            HttpBackendClient::new("http://localhost:3001/api/", None, Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:3001/api");
    }

    #[test]
    fn test_from_config() {
        let config = BridgeConfig::default();
        let client = HttpBackendClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3001/api");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_failed_result() {
        // Port 9 (discard) on localhost is closed on test machines.
        let client =
            HttpBackendClient::new("http://127.0.0.1:9/api", None, Duration::from_secs(2))
                .unwrap();
        let response = client
            .verify(&CardId::new("RF001234"), &Pin::new("123456"))
            .await;
        assert!(!response.success);
        assert!(
            response
                .message
                .unwrap()
                .starts_with("Backend unreachable")
        );
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let client =
            HttpBackendClient::new("http://127.0.0.1:9/api", None, Duration::from_secs(2))
                .unwrap();
        assert!(matches!(
            client.health_check().await,
            Err(BackendError::Unreachable(_))
        ));
    }
}

use tokio::sync::{mpsc, oneshot};

use cardbridge_core::{Amount, ApiResponse};
use cardbridge_hardware::DeviceStatus;
use cardbridge_network::{BridgeControl, ServiceStatus};
use cardbridge_session::SessionSnapshot;

use crate::error::{Result, ServiceError};
use crate::service::Input;

/// Cloneable handle to a running [`BridgeService`](crate::BridgeService).
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<Input>,
    device: DeviceStatus,
}

impl BridgeHandle {
    pub(crate) fn new(tx: mpsc::Sender<Input>, device: DeviceStatus) -> Self {
        Self { tx, device }
    }

    /// Charge the verified session.
    ///
    /// The outcome is broadcast as `payment_processed` and returned. A
    /// missing or expired session yields a failed result, never an error.
    pub async fn request_payment(&self, amount: Amount, description: Option<String>) -> ApiResponse {
        let (reply, rx) = oneshot::channel();
        let sent = self
            .tx
            .send(Input::Payment {
                amount,
                description,
                reply,
            })
            .await;
        if sent.is_err() {
            return ApiResponse::failure(ServiceError::Stopped.to_string());
        }
        rx.await
            .unwrap_or_else(|_| ApiResponse::failure(ServiceError::Stopped.to_string()))
    }

    /// Current session state.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Stopped` if the service has exited.
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Input::Snapshot { reply })
            .await
            .map_err(|_| ServiceError::Stopped)?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    /// Connection state of the line source.
    pub fn device(&self) -> &DeviceStatus {
        &self.device
    }
}

impl BridgeControl for BridgeHandle {
    async fn request_payment(&self, amount: Amount, description: Option<String>) -> ApiResponse {
        BridgeHandle::request_payment(self, amount, description).await
    }

    async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            device: self.device.device().to_string(),
            device_connected: self.device.is_connected(),
            session: self.snapshot().await.ok(),
        }
    }
}

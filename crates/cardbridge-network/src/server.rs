//! Real-time server: WebSocket subscribers plus a small HTTP control surface.
//!
//! # Routes
//!
//! ```text
//! GET  /ws       WebSocket; every connection becomes a broadcaster subscriber
//! GET  /status   device connectivity, subscriber count, session snapshot
//! POST /payment  {amount, description?} -> {success, data?, message?}
//! ```
//!
//! CORS is open to any origin; POS front-ends are served from elsewhere.
//!
//! Text frames received on `/ws` are classified with
//! [`InboundMessage::parse`]: notifications are relayed to all subscribers,
//! `process_payment` commands start a payment whose outcome arrives as the
//! usual `payment_processed` broadcast, anything else is dropped.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, trace};

use cardbridge_core::constants::{DEFAULT_WS_BIND, DEFAULT_WS_PORT};
use cardbridge_core::{Amount, ApiResponse, BridgeConfig, SubscriberId};
use cardbridge_protocol::{InboundMessage, Notification, NotificationKind};
use cardbridge_session::SessionSnapshot;

use crate::broadcaster::Broadcaster;
use crate::error::{NetworkError, Result};
use crate::subscriber::ChannelSubscriber;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Operations the server needs from the bridge service.
pub trait BridgeControl: Clone + Send + Sync + 'static {
    /// Charge the verified session. The outcome is also broadcast.
    fn request_payment(
        &self,
        amount: Amount,
        description: Option<String>,
    ) -> impl Future<Output = ApiResponse> + Send;

    /// Device and session state.
    fn status(&self) -> impl Future<Output = ServiceStatus> + Send;
}

/// Device and session part of `/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub device: String,
    pub device_connected: bool,
    /// `None` once the service has stopped.
    pub session: Option<SessionSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    #[serde(flatten)]
    service: ServiceStatus,
    subscribers: usize,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
struct PaymentBody {
    amount: u64,
    #[serde(default)]
    description: Option<String>,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,

    /// Per-connection outbound queue; a client that falls this far behind
    /// is disconnected.
    pub max_send_queue: usize,
}

impl ServerConfig {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            bind_addr: config.ws_addr(),
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(DEFAULT_WS_BIND, DEFAULT_WS_PORT),
            max_send_queue: 256,
        }
    }
}

/// Shared state passed to handlers.
#[derive(Clone)]
pub struct AppState<C> {
    pub broadcaster: Arc<Broadcaster>,
    pub control: C,
    pub max_send_queue: usize,
}

/// Build the router with all routes.
pub fn build_router<C: BridgeControl>(state: AppState<C>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::<C>))
        .route("/status", get(status_handler::<C>))
        .route("/payment", post(payment_handler::<C>))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind and serve in a background task.
///
/// # Errors
///
/// Returns `NetworkError::BindFailed` if the address cannot be bound.
pub async fn start<C: BridgeControl>(
    config: ServerConfig,
    broadcaster: Arc<Broadcaster>,
    control: C,
) -> Result<ServerHandle> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(|source| NetworkError::BindFailed {
            addr: config.bind_addr,
            source,
        })?;
    let local_addr = listener.local_addr()?;

    let router = build_router(AppState {
        broadcaster,
        control,
        max_send_queue: config.max_send_queue,
    });

    info!(addr = %local_addr, "Real-time server listening");

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "Real-time server stopped");
        }
    });

    Ok(ServerHandle { local_addr, task })
}

/// Handle to the running server task.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop serving.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn ws_handler<C: BridgeControl>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<C>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket<C: BridgeControl>(socket: WebSocket, state: AppState<C>) {
    let (subscriber, mut rx) = ChannelSubscriber::channel(state.max_send_queue);
    let id = state.broadcaster.subscribe(subscriber.with_kind("websocket"));
    info!(subscriber = %id, total = state.broadcaster.len(), "WebSocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(text) => {
                        if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // Removed by the broadcaster.
                    None => break,
                },
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    trace!(subscriber = %id, "Sent ping");
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    let reader_state = state.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => handle_inbound(&reader_state, id, text.as_str()),
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    state.broadcaster.unsubscribe(id);
    info!(subscriber = %id, total = state.broadcaster.len(), "WebSocket client disconnected");
}

fn handle_inbound<C: BridgeControl>(state: &AppState<C>, from: SubscriberId, text: &str) {
    match InboundMessage::parse(text) {
        Some(InboundMessage::Relay(notification)) => {
            debug!(subscriber = %from, kind = notification.type_name(), "Relaying client notification");
            state.broadcaster.publish(&notification);
        }
        Some(InboundMessage::ProcessPayment {
            amount,
            description,
        }) => match Amount::new(amount) {
            Ok(amount) => {
                debug!(subscriber = %from, amount = %amount, "Payment requested over WebSocket");
                let control = state.control.clone();
                tokio::spawn(async move {
                    control.request_payment(amount, description).await;
                });
            }
            Err(e) => {
                state
                    .broadcaster
                    .publish(&Notification::new(NotificationKind::PaymentProcessed {
                        success: false,
                        data: json!({}),
                        message: e.to_string(),
                    }));
            }
        },
        None => debug!(subscriber = %from, "Ignoring unrecognized client message"),
    }
}

async fn status_handler<C: BridgeControl>(State(state): State<AppState<C>>) -> impl IntoResponse {
    let report = StatusReport {
        service: state.control.status().await,
        subscribers: state.broadcaster.len(),
        version: cardbridge_core::VERSION,
    };
    Json(report)
}

async fn payment_handler<C: BridgeControl>(
    State(state): State<AppState<C>>,
    Json(body): Json<PaymentBody>,
) -> impl IntoResponse {
    let amount = match Amount::new(body.amount) {
        Ok(amount) => amount,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::failure(e.to_string())),
            );
        }
    };

    let result = state.control.request_payment(amount, body.description).await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Idle;

    impl BridgeControl for Idle {
        async fn request_payment(&self, _amount: Amount, _description: Option<String>) -> ApiResponse {
            ApiResponse::failure("No verified session")
        }

        async fn status(&self) -> ServiceStatus {
            ServiceStatus {
                device: "COM4".to_string(),
                device_connected: false,
                session: None,
            }
        }
    }

    #[test]
    fn test_server_config_from_bridge_config() {
        let bridge = BridgeConfig {
            ws_port: 9000,
            ..BridgeConfig::default()
        };
        let config = ServerConfig::from_config(&bridge);
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.max_send_queue, 256);
    }

    #[test]
    fn test_build_router() {
        let _router = build_router(AppState {
            broadcaster: Arc::new(Broadcaster::new()),
            control: Idle,
            max_send_queue: 8,
        });
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_address() {
        let first = start(
            ServerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                max_send_queue: 8,
            },
            Arc::new(Broadcaster::new()),
            Idle,
        )
        .await
        .unwrap();

        let err = start(
            ServerConfig {
                bind_addr: first.local_addr(),
                max_send_queue: 8,
            },
            Arc::new(Broadcaster::new()),
            Idle,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, NetworkError::BindFailed { addr, .. } if addr == first.local_addr()));
        first.shutdown();
    }
}

//! Real-time delivery of bridge notifications.
//!
//! - [`Broadcaster`]: subscriber set and `publish` fan-out
//! - [`server`]: axum WebSocket server, `/status` and `/payment`
//! - [`PeerForwarder`]: pushes notifications to an upstream WebSocket peer
//! - [`LogSubscriber`]: console sink

pub mod broadcaster;
pub mod error;
pub mod peer;
pub mod server;
pub mod subscriber;

pub use broadcaster::Broadcaster;
pub use error::{DeliveryError, NetworkError, Result};
pub use peer::PeerForwarder;
pub use server::{AppState, BridgeControl, ServerConfig, ServerHandle, ServiceStatus};
pub use subscriber::{ChannelSubscriber, LogSubscriber, Subscriber};

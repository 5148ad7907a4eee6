//! Serial line protocol and real-time wire format of the card bridge.
//!
//! ```text
//! serial bytes -> SerialLineCodec -> line -> parse() -> DeviceEvent
//! session output -> Notification -> JSON text frame
//! ```

pub mod codec;
pub mod event;
pub mod notification;

pub use codec::SerialLineCodec;
pub use event::{DeviceEvent, parse};
pub use notification::{InboundMessage, Notification, NotificationKind};

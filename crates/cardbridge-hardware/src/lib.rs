//! Card reader device access for the card bridge.
//!
//! The reader and keypad share one serial link and report newline delimited
//! events. This crate turns that link into a [`LineSource`]: an async stream
//! of trimmed text lines with reconnect handled internally.
//!
//! - [`SerialLineSource`]: real device, read on a dedicated thread.
//! - [`MockLineSource`]: channel-fed, for tests and demos.
//! - [`AnyLineSource`]: enum dispatch over both.
//!
//! Open failures at startup are reported as [`HardwareError::Unavailable`];
//! a device lost at runtime is retried with exponential backoff and only
//! shows up in [`DeviceStatus`].

pub mod devices;
pub mod error;
pub mod mock;
pub mod serial;
pub mod traits;
pub mod types;

pub use devices::AnyLineSource;
pub use error::{HardwareError, Result};
pub use mock::{MockLineSource, MockLineSourceHandle};
pub use serial::{SerialConfig, SerialLineSource};
pub use traits::LineSource;
pub use types::DeviceStatus;

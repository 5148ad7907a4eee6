//! Card bridge service.
//!
//! Wires a line source, the session state machine, the backend client and
//! the broadcaster together behind one actor task. See [`service`] for the
//! task layout.

pub mod error;
pub mod handle;
pub mod recorder;
pub mod service;

pub use error::{Result, ServiceError};
pub use handle::BridgeHandle;
pub use recorder::ReadingRecorder;
pub use service::BridgeService;

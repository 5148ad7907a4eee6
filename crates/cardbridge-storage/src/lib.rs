//! SQLite reading log for the card bridge.
//!
//! Optional side channel: raw device readings (PINs masked) and payment
//! outcomes are appended here for later inspection. Nothing in the bridge
//! reads them back at runtime.

pub mod connection;
pub mod error;
pub mod models;
pub mod repository;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{NewPayment, NewReading, PaymentRecord, Reading};
pub use repository::{ReadingLogRepository, SqliteReadingLogRepository};

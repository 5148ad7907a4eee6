use thiserror::Error;

/// Errors seen by callers of [`BridgeHandle`](crate::BridgeHandle).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    /// The service task has exited.
    #[error("Bridge service stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, ServiceError>;

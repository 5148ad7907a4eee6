use cardbridge_core::ApiResponse;
use thiserror::Error;

/// Failures talking to the backend API.
///
/// These never reach the session state machine as errors: the client turns
/// each one into a failed [`ApiResponse`] via [`BackendError::into_response`].
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection refused, DNS failure, timeout.
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// Non-2xx status without a usable JSON envelope.
    #[error("Backend rejected request with status {status}")]
    Rejected { status: u16 },

    /// A 2xx response whose body is not the expected envelope.
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client setup failed: {0}")]
    Setup(String),
}

impl BackendError {
    pub fn unreachable(cause: impl Into<String>) -> Self {
        Self::Unreachable(cause.into())
    }

    pub fn invalid_response(cause: impl Into<String>) -> Self {
        Self::InvalidResponse(cause.into())
    }

    /// Failed result carrying this error as its message.
    pub fn into_response(self) -> ApiResponse {
        ApiResponse::failure(self.to_string())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return BackendError::Rejected {
                status: status.as_u16(),
            };
        }
        if err.is_decode() {
            return BackendError::InvalidResponse(err.to_string());
        }
        BackendError::Unreachable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_response() {
        let response = BackendError::Rejected { status: 502 }.into_response();
        assert!(!response.success);
        assert_eq!(
            response.message.as_deref(),
            Some("Backend rejected request with status 502")
        );
    }

    #[test]
    fn test_unreachable_message() {
        let err = BackendError::unreachable("connection refused");
        assert_eq!(err.to_string(), "Backend unreachable: connection refused");
    }
}

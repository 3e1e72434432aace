use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Transport failure, timeout or 5xx. The whole request may be retried later.
    #[error("group provider unavailable: {message}")]
    Unavailable { message: String },

    /// The provider refused the operation (invalid payload or credentials).
    #[error("group provider rejected {operation} (HTTP {status}): {reason}")]
    Rejected {
        operation: String,
        status: u16,
        reason: String,
    },

    #[error("malformed reply from group provider: {message}")]
    BadResponse { message: String },
}

impl ProviderError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        ProviderError::Unavailable {
            message: message.into(),
        }
    }

    pub fn bad_response(message: impl Into<String>) -> Self {
        ProviderError::BadResponse {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Unavailable { .. })
    }
}

use crate::retry::{Classifiable, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider '{provider}' request failed: {message}")]
    RequestFailed { provider: String, message: String },

    #[error("provider '{provider}' rate limited the call")]
    RateLimited { provider: String },

    #[error("provider '{provider}' timed out")]
    Timeout { provider: String },

    #[error("provider '{provider}' returned an unusable response: {message}")]
    InvalidResponse { provider: String, message: String },
}

impl ProviderError {
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::RequestFailed { provider, .. }
            | ProviderError::RateLimited { provider }
            | ProviderError::Timeout { provider }
            | ProviderError::InvalidResponse { provider, .. } => provider,
        }
    }
}

impl Classifiable for ProviderError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            ProviderError::Timeout { .. } => ErrorKind::Timeout,
            ProviderError::RateLimited { .. } => ErrorKind::ServiceUnavailable,
            ProviderError::RequestFailed { .. } | ProviderError::InvalidResponse { .. } => {
                ErrorKind::Other
            }
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

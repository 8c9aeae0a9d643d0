//! Commerce API client error types.

/// Errors from commerce API calls.
#[derive(Debug, thiserror::Error)]
pub enum CommerceApiError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The request did not complete within the client timeout.
    #[error("request timeout calling {endpoint} after {elapsed_ms}ms")]
    Timeout { endpoint: String, elapsed_ms: u64 },
    /// The API returned a non-2xx status.
    #[error("commerce API {endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// A GraphQL call succeeded at the HTTP level but reported errors.
    #[error("commerce API {endpoint} rejected the request: {message}")]
    Rejected { endpoint: String, message: String },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {reason}")]
    Deserialization { endpoint: String, reason: String },
    /// The operation cannot be expressed against the API.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// Missing or malformed client settings.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CommerceApiError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            CommerceApiError::Api { status, .. } => Some(*status),
            CommerceApiError::Http { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn api(endpoint: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        CommerceApiError::Api {
            endpoint: endpoint.into(),
            status,
            body: body.into(),
        }
    }
}

pub type CommerceResult<T> = Result<T, CommerceApiError>;

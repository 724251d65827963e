use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timeout")]
    Timeout,

    #[error("HTTP {status}: {reason}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout;
        }
        if e.is_decode() {
            return Self::ResponseFormat(e.to_string());
        }
        if e.is_builder() {
            return Self::InvalidRequest(e.to_string());
        }
        Self::Network(e.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}

/// Whether a failed call may be attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Transient,
    Permanent,
}

/// Timeouts and HTTP 429 are transient; everything else is permanent.
pub fn classify_default(error: &TransportError) -> Classification {
    match error {
        TransportError::Timeout => Classification::Transient,
        TransportError::Status { status: 429, .. } => Classification::Transient,
        _ => Classification::Permanent,
    }
}

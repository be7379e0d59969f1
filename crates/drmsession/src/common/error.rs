use thiserror::Error;

#[derive(Debug, Error)]
pub enum DrmsError {
    #[error("A session is already active")]
    DoubleInit,
    #[error("No active session")]
    NotActive,
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Backend protocol error: {0}")]
    BackendProtocolError(String),
    #[error("Timeout expired")]
    Timeout,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Backend error: {0}")]
    BackendError(String),
}

impl DrmsError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DrmsError::Timeout)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DrmsError::NotFound(_))
    }
}

impl From<std::io::Error> for DrmsError {
    fn from(e: std::io::Error) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<serde_json::error::Error> for DrmsError {
    fn from(e: serde_json::error::Error) -> Self {
        Self::BackendProtocolError(e.to_string())
    }
}

impl From<anyhow::Error> for DrmsError {
    fn from(error: anyhow::Error) -> Self {
        Self::BackendError(format!("{error:#}"))
    }
}

pub fn invalid_argument<T>(message: impl Into<String>) -> crate::Result<T> {
    Err(DrmsError::InvalidArgument(message.into()))
}

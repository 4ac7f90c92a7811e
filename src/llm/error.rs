//! Completion endpoint error types

use thiserror::Error;

/// Completion failure with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Unavailable, message)
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Rejected { status }, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Malformed, message)
    }

    /// Text shown to the end user for this failure
    pub fn user_message(&self) -> String {
        match self.kind {
            UpstreamErrorKind::Unavailable => {
                "The request timed out or the model service is unreachable. Please try again."
                    .to_string()
            }
            UpstreamErrorKind::Rejected { status } => {
                format!("The model service rejected the request (HTTP {status}): {}", self.message)
            }
            UpstreamErrorKind::Malformed => {
                "Failed to get a response from the model. Please try again.".to_string()
            }
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Network issues, timeouts
    Unavailable,
    /// Non-success HTTP status
    Rejected { status: u16 },
    /// Body held nothing salvageable
    Malformed,
}

impl UpstreamErrorKind {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable => true,
            Self::Rejected { status } => *status == 429 || (500..=599).contains(status),
            Self::Malformed => false,
        }
    }
}

//! Speech provider error types

use thiserror::Error;

/// Transcription, synthesis or playback error with classification
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct SpeechError {
    pub kind: SpeechErrorKind,
    pub message: String,
}

impl SpeechError {
    pub fn new(kind: SpeechErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(SpeechErrorKind::Unavailable, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SpeechErrorKind::Network, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(SpeechErrorKind::Api, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(SpeechErrorKind::Io, message)
    }

    pub fn cancelled() -> Self {
        Self::new(SpeechErrorKind::Cancelled, "cancelled")
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == SpeechErrorKind::Cancelled
    }

    /// Map a failed reqwest send onto a classified error
    pub fn from_request(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            Self::network(format!("Connection failed: {e}"))
        } else {
            Self::api(format!("Request failed: {e}"))
        }
    }
}

impl From<std::io::Error> for SpeechError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

/// Error classification. Everything but `Cancelled` degrades the turn to
/// text-only rather than failing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechErrorKind {
    /// No provider configured (missing key or binary)
    Unavailable,
    /// Timeouts, connection failures
    Network,
    /// Provider returned an error response
    Api,
    /// Local file or process failure
    Io,
    /// Aborted by a superseding session
    Cancelled,
}

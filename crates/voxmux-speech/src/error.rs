use thiserror::Error;

/// Errors raised by synthesis backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend failed to start up
    #[error("Backend initialization failed: {0}\nBackend: {1}")]
    InitializationFailed(String, String),

    /// Synthesis call failed (retryable against another backend)
    #[error("Synthesis failed: {0}\nBackend: {1}")]
    SynthesisFailed(String, String),

    /// Voice not served by this backend
    #[error("Voice not found: '{0}'\nBackend: {1}")]
    VoiceNotFound(String, String),

    /// Requested format is not produced by this backend
    #[error("Audio format not supported: {0}\nBackend: {1}")]
    FormatNotSupported(crate::types::AudioFormat, String),

    /// Backend cannot take work right now
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The call observed its cancellation signal
    #[error("Synthesis cancelled")]
    Cancelled,

    /// Other errors
    #[error("Backend error: {0}\nContext: {1}")]
    Other(String, String),
}

impl BackendError {
    /// Create a synthesis failure attributed to `backend`
    pub fn synthesis(msg: impl Into<String>, backend: impl Into<String>) -> Self {
        Self::SynthesisFailed(msg.into(), backend.into())
    }

    /// Whether the error came from honoring a cancellation signal
    pub fn is_cancellation(&self) -> bool {
        matches!(self, BackendError::Cancelled)
    }

    /// Whether the backend turned down the request itself rather than failing
    ///
    /// These say nothing about the backend's health.
    pub fn is_request_rejection(&self) -> bool {
        matches!(
            self,
            BackendError::FormatNotSupported(_, _) | BackendError::VoiceNotFound(_, _)
        )
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Other(err.to_string(), "io".to_string())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

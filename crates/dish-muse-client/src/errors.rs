/// API envelope status the image backend uses for terminal/unauthorized
/// failures (quota exhausted, app disabled, bad credentials).
pub const UNAUTHORIZED_STATUS: i64 = 999;

/// Errors returned by the chat and image clients.
///
/// Local, recoverable conditions (one unparsable SSE line, one transient poll
/// failure) never surface here; they are logged and skipped where they happen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Connection, timeout or body read failure.
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },
    /// Endpoint answered with a non-success HTTP status and no usable envelope.
    #[error("{operation} returned HTTP {status}: {body}")]
    Http {
        operation: &'static str,
        status: u16,
        body: String,
    },
    /// Envelope carried a nonzero status. Displays exactly the server message.
    #[error("{message}")]
    Api { status: i64, message: String },
    /// Response body did not match the declared contract.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The image job reached `FAILED`.
    #[error("image generation failed (task {task_id})")]
    GenerationFailed { task_id: String },
    /// The job succeeded (or the inline call returned) without an image.
    #[error("image generation finished without a result image (task {task_id})")]
    MissingResult { task_id: String },
    /// Polling budget exhausted before a terminal state.
    #[error("image generation timed out after {attempts} status checks, please try again later")]
    Timeout { attempts: u32 },
    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
}

impl ClientError {
    pub(crate) fn transport(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            operation,
            message: err.to_string(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns `true` for the backend's terminal/unauthorized envelope status.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == UNAUTHORIZED_STATUS)
    }

    /// Returns `true` when repeating the same request may succeed.
    ///
    /// Used by the poll loop to decide which query failures it may absorb.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Http { .. } | Self::Protocol(_) => true,
            Self::Api { .. } => !self.is_unauthorized(),
            Self::Config(_)
            | Self::GenerationFailed { .. }
            | Self::MissingResult { .. }
            | Self::Timeout { .. }
            | Self::Cancelled => false,
        }
    }
}

//! Error types for render streams.

use thiserror::Error;

/// Errors surfaced on a render stream.
///
/// Every failure funnels through a single reporting path, so a stream
/// surfaces at most one `RenderError` over its lifetime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The render function or a continuation returned an error.
    #[error("Render failed: {0}")]
    Producer(String),

    /// The render function or a continuation panicked.
    #[error("Render panicked: {0}")]
    Panicked(String),

    /// The producer reported a production error explicitly.
    #[error("Render error reported: {0}")]
    Reported(String),

    /// The producer returned without pausing or ending the stream.
    #[error("Producer returned without pausing or ending the stream")]
    Stalled,

    /// The producer broke the write protocol.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Invalid stream configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The downstream sink rejected a chunk.
    #[error("Sink error: {0}")]
    Sink(String),
}

impl RenderError {
    /// Create a producer error from any displayable message.
    pub fn producer(message: impl std::fmt::Display) -> Self {
        RenderError::Producer(message.to_string())
    }

    /// Whether this error originated in the producer rather than the adapter.
    pub fn is_producer_fault(&self) -> bool {
        matches!(
            self,
            Self::Producer(_) | Self::Panicked(_) | Self::Reported(_) | Self::Stalled
        )
    }
}

impl From<anyhow::Error> for RenderError {
    fn from(err: anyhow::Error) -> Self {
        RenderError::Producer(format!("{:#}", err))
    }
}

impl From<std::fmt::Error> for RenderError {
    fn from(err: std::fmt::Error) -> Self {
        RenderError::Producer(err.to_string())
    }
}

impl From<toml::de::Error> for RenderError {
    fn from(err: toml::de::Error) -> Self {
        RenderError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::Config(err.to_string())
    }
}

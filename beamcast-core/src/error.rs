//! Error types for Beamcast

use thiserror::Error;

/// Result type alias using BeamcastError
pub type Result<T> = std::result::Result<T, BeamcastError>;

/// Main error type for Beamcast operations
#[derive(Debug, Error)]
pub enum BeamcastError {
    /// Invalid session configuration (fatal, never retried)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Frame source unavailable or failed (fatal for the session)
    #[error("Capture error: {0}")]
    Capture(String),

    /// Encoder could not be initialized (fatal)
    #[error("Encoder init error: {0}")]
    EncodeInit(String),

    /// Encoder failed on a frame
    #[error("Encoder error: {0}")]
    Encode(String),

    /// Wire handshake failed (retried while reconnecting)
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Transport link degraded (transient, triggers reconnect)
    #[error("Link degraded: {0}")]
    Link(String),

    /// Session is not in a state that allows the operation
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Session already running
    #[error("Session already running")]
    SessionAlreadyRunning,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BeamcastError>,
    },
}

impl BeamcastError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a capture error
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Create an encoder init error
    pub fn encode_init(msg: impl Into<String>) -> Self {
        Self::EncodeInit(msg.into())
    }

    /// Create an encoder error
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a handshake error
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    /// Create a link degradation error
    pub fn link(msg: impl Into<String>) -> Self {
        Self::Link(msg.into())
    }

    /// Create an invalid-state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Whether this error is transient and worth a reconnect cycle
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Link(_) | Self::Handshake(_) | Self::Io(_))
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BeamcastError::link("write failed").is_transient());
        assert!(BeamcastError::handshake("timeout").is_transient());
        assert!(!BeamcastError::config("bad bounds").is_transient());
        assert!(!BeamcastError::encode_init("no backend").is_transient());
    }

    #[test]
    fn test_context_chain() {
        let err: Result<()> = Err(BeamcastError::link("broken pipe"));
        let err = err.context("sending video unit").unwrap_err();
        assert!(err.to_string().contains("sending video unit"));
    }
}

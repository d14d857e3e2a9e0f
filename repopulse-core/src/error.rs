//! Error types for repopulse-core

use thiserror::Error;

/// Main error type for the repopulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed feed payload
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// Duration sample that is negative or not a number
    #[error("invalid sample for {category}: {value}")]
    InvalidSample { category: String, value: f64 },

    /// The smoother has been stopped and accepts no more work
    #[error("rate smoother stopped")]
    SmootherStopped,

    /// A background task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(String),
}

/// Errors delivered on the feed error channel.
///
/// These never enter the smoothing buffer; they are handed to whoever
/// subscribed to the event source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Payload was not valid JSON or did not match a known message shape
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The transport failed (connection refused, HTTP status, timeout)
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The remote side closed the stream
    #[error("feed closed")]
    Closed,
}

impl FeedError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        FeedError::Parse {
            message: message.into(),
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        FeedError::Transport {
            message: message.into(),
        }
    }
}

/// Result type alias for repopulse-core
pub type Result<T> = std::result::Result<T, Error>;

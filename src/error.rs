//! Error types for pywire.

use std::sync::Arc;

use thiserror::Error;

/// Main error type for all worker-session operations.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// I/O error on the worker socket or the barrier channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed framing on the worker stream.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The worker sent an exception envelope.
    ///
    /// If the writer task recorded a failure before the envelope arrived,
    /// that failure is chained as the cause: the worker-side message is the
    /// primary content, the write-side failure explains how it got there.
    #[error("{message}")]
    WorkerRaised {
        /// Decoded text of the worker's exception envelope.
        message: String,
        /// Recorded writer-task failure, if any.
        #[source]
        cause: Option<Arc<WorkerError>>,
    },

    /// The task was interrupted.
    ///
    /// Supersedes every other error kind once interruption is observed;
    /// whatever the socket reported at that point is an artifact of the
    /// cancellation itself.
    #[error("task cancelled")]
    Cancelled,

    /// The writer task recorded a failure; the reader surfaces it instead
    /// of its own secondary symptom (typically an unexpected end-of-file).
    #[error("worker write side failed")]
    WriteSide(#[source] Arc<WorkerError>),

    /// Local listener/port acquisition failed.
    ///
    /// Fatal to the session, reported before any protocol bytes are
    /// exchanged.
    #[error("resource setup failed: {0}")]
    ResourceSetup(String),

    /// The worker closed its output stream without an end-of-stream marker.
    #[error("worker exited unexpectedly")]
    UnexpectedExit,

    /// Worker pool collaborator failure.
    #[error("worker pool error: {0}")]
    Pool(String),

    /// A recognized configuration option carried an unparseable value.
    #[error("invalid value for option `{key}`: {value}")]
    InvalidOption {
        /// Option key as it appears in the options map.
        key: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Result type alias using WorkerError.
pub type Result<T> = std::result::Result<T, WorkerError>;

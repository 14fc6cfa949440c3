//! Error types for the counter service

use thiserror::Error;

/// Main error type for the counter service
#[derive(Error, Debug)]
pub enum Error {
    /// Counter store error (fatal to the request)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Legacy provider error
    #[error("Legacy provider error: {0}")]
    Legacy(#[from] LegacyError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Background task failed to join
    #[error("Task error: {0}")]
    Task(String),
}

/// Counter store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection to the store failed or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Command was rejected or failed on the server
    #[error("Command {command} failed: {message}")]
    Command {
        /// Command name, e.g. `INCR`
        command: &'static str,
        /// Server or client message
        message: String,
    },

    /// Operation against a key holding the wrong kind of value
    #[error("Wrong type for key: {0}")]
    WrongType(String),

    /// Operation did not complete in time
    #[error("Store operation timed out")]
    Timeout,
}

/// Legacy provider errors. These never escape the before-count fetcher;
/// exhausted retries degrade to a cached zero.
#[derive(Error, Debug)]
pub enum LegacyError {
    /// Network failure or timeout
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Body is not wrapped in the expected callback envelope
    #[error("Malformed envelope: {0}")]
    Envelope(String),

    /// Envelope interior is not the expected JSON object
    #[error("Malformed payload: {0}")]
    Payload(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

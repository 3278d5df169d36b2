//! Error types for SeriesVault

use std::io;
use thiserror::Error;

/// Message carried by every rejected request line or unroutable command
pub const WRONG_COMMAND: &str = "wrong command";

/// Result type alias for SeriesVault operations
pub type Result<T> = std::result::Result<T, SeriesVaultError>;

/// Custom error types for SeriesVault
#[derive(Error, Debug)]
pub enum SeriesVaultError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Executor(String),

    #[error("request exceeds {0} bytes")]
    RequestTooLarge(usize),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Client error: {0}")]
    Client(String),
}

impl SeriesVaultError {
    /// Rejection of a request line that is not a valid `put` or `get`
    pub fn wrong_command() -> Self {
        SeriesVaultError::Parse(WRONG_COMMAND.to_string())
    }
}

impl From<nom::Err<nom::error::Error<&str>>> for SeriesVaultError {
    fn from(_: nom::Err<nom::error::Error<&str>>) -> Self {
        SeriesVaultError::wrong_command()
    }
}

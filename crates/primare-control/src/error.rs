//! Error types for amplifier control

use primare_protocol::{Command, ProtocolError};
use thiserror::Error;

/// Errors surfaced to callers of the command client
#[derive(Debug, Error)]
pub enum ControlError {
    /// I/O error on the serial line
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port could not be opened or configured
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Command could not be built
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No acknowledgement arrived in time
    #[error("no reply to {command} after {ms}ms")]
    Timeout {
        /// Command that was waiting
        command: Command,
        /// Timeout that elapsed
        ms: u64,
    },

    /// The acknowledgement did not confirm the command
    #[error("reply to {command} did not match: {reason}")]
    Mismatch {
        /// Command that was waiting
        command: Command,
        /// What was wrong with the reply
        reason: String,
    },

    /// Rejected before anything was written
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The connection is closed or the reader has stopped
    #[error("amplifier disconnected")]
    Disconnected,

    /// Device profile or connection settings are unusable
    #[error("configuration error: {0}")]
    Config(String),
}

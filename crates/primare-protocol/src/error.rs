//! Error types for Primare frame decoding and command building

use thiserror::Error;

use crate::command::Command;

/// Reasons a buffered byte sequence could not be decoded as a frame
///
/// All of these are recovered locally by the codec: the offending bytes are
/// discarded and decoding resynchronizes on the next `STX`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Bytes arrived that do not start with `STX`
    #[error("missing STX, discarded {discarded} bytes")]
    MissingStx { discarded: usize },

    /// No terminator found within the maximum frame length
    #[error("frame exceeds {len} bytes without DLE ETX terminator")]
    Oversized { len: usize },

    /// A `DLE` was followed by something other than `DLE` or `ETX`
    #[error("stray escape: DLE followed by 0x{byte:02X}")]
    StrayEscape { byte: u8 },

    /// `STX DLE ETX` with no variable byte
    #[error("empty frame")]
    EmptyFrame,
}

/// Errors building a command from the command table
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The command template has a `YY` slot but no operand was supplied
    #[error("command {0} requires an operand")]
    MissingOperand(Command),

    /// An operand was supplied for a command that takes none
    #[error("command {0} takes no operand")]
    UnexpectedOperand(Command),

    /// The command name is not in the table
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

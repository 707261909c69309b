//! Error types for the command line tool

use primare_control::ControlError;
use thiserror::Error;

/// Errors from running one operation
#[derive(Debug, Error)]
pub enum CliError {
    /// No operation with this name
    #[error("no such operation: {0}")]
    UnknownOperation(String),

    /// The operation needs a value
    #[error("{0} needs a value")]
    MissingArgument(&'static str),

    /// The operation takes no value
    #[error("{0} takes no value")]
    UnexpectedArgument(&'static str),

    /// The value has the wrong type or range
    #[error("{operation} expects {expected}")]
    BadArgument {
        /// Operation name
        operation: &'static str,
        /// What would have been accepted
        expected: &'static str,
    },

    /// A token could not be read as a value
    #[error("cannot read {0:?} as true, false or a number")]
    BadToken(String),

    /// The amplifier rejected or did not confirm the operation
    #[error(transparent)]
    Control(#[from] ControlError),
}

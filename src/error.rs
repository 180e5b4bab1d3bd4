//! Error types for the Gridweave command line

use thiserror::Error;

/// Errors in the command-line arguments
#[derive(Error, Debug, PartialEq)]
pub enum CliError {
    #[error("{flag} requires {what}")]
    MissingValue { flag: String, what: &'static str },

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),
}

pub type Result<T> = std::result::Result<T, CliError>;

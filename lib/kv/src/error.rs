//! Key-value store error types.

use std::fmt;

/// Errors from key-value store backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// The backend could not be reached.
    Unavailable {
        /// Error details.
        details: String,
    },
    /// The backend rejected or failed a command.
    Command {
        /// The command that failed.
        command: &'static str,
        /// Error details.
        details: String,
    },
    /// A write was attempted with a zero time-to-live.
    InvalidTtl,
}

impl fmt::Display for KvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => {
                write!(f, "key-value store unavailable: {details}")
            }
            Self::Command { command, details } => {
                write!(f, "key-value store {command} failed: {details}")
            }
            Self::InvalidTtl => write!(f, "time-to-live must be greater than zero"),
        }
    }
}

impl std::error::Error for KvError {}

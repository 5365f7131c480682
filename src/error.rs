//! Error taxonomy and process exit codes.
//!
//! Transient conditions (no link yet, partial deliveries, the start gate) are
//! not errors and never reach this type. Everything here ends the process.

use thiserror::Error;

use crate::payload::PayloadError;

/// Result alias used throughout the driver.
pub type Result<T, E = DriverError> = std::result::Result<T, E>;

/// Fatal driver errors.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("outgoing message of {size} bytes overflows the {limit}-byte buffer")]
    EncodeOverflow { size: usize, limit: usize },

    #[error("incoming message too big: {size} bytes (max {limit})")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("failed to decode message: {0}")]
    Decode(#[from] PayloadError),

    #[error("delivery arrived on unknown link {0}")]
    UnknownLink(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine error: {0}")]
    Engine(String),
}

impl DriverError {
    /// Create a configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Decode(_) => 2,
            Self::Config(_)
            | Self::EncodeOverflow { .. }
            | Self::MessageTooLarge { .. }
            | Self::UnknownLink(_)
            | Self::Io(_)
            | Self::Engine(_) => 1,
        }
    }
}

impl From<anyhow::Error> for DriverError {
    fn from(error: anyhow::Error) -> Self {
        Self::Engine(format!("{error:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(DriverError::config("bad flag").exit_code(), 1);
        assert_eq!(
            DriverError::EncodeOverflow { size: 3, limit: 2 }.exit_code(),
            1
        );
        assert_eq!(
            DriverError::MessageTooLarge { size: 3, limit: 2 }.exit_code(),
            1
        );
        assert_eq!(DriverError::from(PayloadError::BadHeader).exit_code(), 2);
    }

    #[test]
    fn test_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("failed to open connection");
        let converted = DriverError::from(err);
        let text = converted.to_string();
        assert!(text.contains("failed to open connection"));
        assert!(text.contains("connection refused"));
    }
}

//! Error types for the driver boundary.

use stampede_generator::GenerateError;
use thiserror::Error;

/// Errors raised by a driver or by the transport reaching it.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver reported a failure
    #[error("Driver error: {0}")]
    Remote(String),

    /// Reading from or writing to the driver failed
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The driver did not answer with the expected handshake
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// A message did not follow the protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The driver process could not be started
    #[error("Failed to spawn driver '{path}': {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The driver does not implement this call
    #[error("Operation not supported by driver: {0}")]
    Unsupported(&'static str),

    /// Waiting was abandoned because the step was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Generating values for a query failed
    #[error(transparent)]
    Generate(#[from] GenerateError),
}

//! Error types for hexlink.

use std::io;
use thiserror::Error;

/// Result type for hexlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for hexlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The serial channel failed while writing, waiting or reading.
    #[error("Channel error: {0}")]
    Channel(String),

    /// The image could not be read any further.
    #[error("Image read error: {0}")]
    SourceRead(#[source] io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

//! Error types for the transport layer.

use std::io;

/// Errors that can occur while framing or encoding backend traffic.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An unterminated line exceeded the configured maximum length.
    #[error("line length {length} exceeds maximum allowed {max}")]
    LineTooLong {
        /// Bytes buffered so far without a terminator.
        length: usize,
        /// The maximum allowed length.
        max: usize,
    },

    /// Failed to serialize an outgoing command to JSON.
    #[error("JSON serialization failed: {0}")]
    JsonSerialize(#[source] serde_json::Error),
}

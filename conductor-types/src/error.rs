//! Error types for the conductor wire protocol.

use thiserror::Error;

/// Errors that can occur while encoding, decoding or framing messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Frame length prefix exceeds the configured limit
    #[error("frame too large: {size} bytes (limit: {limit} bytes)")]
    FrameTooLarge {
        /// Announced frame size.
        size: usize,
        /// Maximum accepted size.
        limit: usize,
    },

    /// Peer closed the stream
    #[error("connection closed")]
    ConnectionClosed,

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Address string could not be parsed
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WireError::FrameTooLarge {
            size: 70_000,
            limit: 65_536,
        };
        assert_eq!(
            err.to_string(),
            "frame too large: 70000 bytes (limit: 65536 bytes)"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WireError>();
    }
}

//! Error types for apns-client.

use thiserror::Error;

/// Main error type for all client operations.
///
/// Protocol-level rejections from the gateway are not errors in this sense;
/// they are delivered as [`crate::protocol::ErrorResponse`] values on the
/// failures channel.
#[derive(Debug, Error)]
pub enum ApnsError {
    /// I/O error during dial, read, or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or handshake error.
    #[error("TLS error: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    /// Gateway address is not a usable `host:port` pair.
    #[error("invalid gateway address: {0}")]
    InvalidGateway(String),

    /// No private key found in the PEM input.
    #[error("no private key found in PEM input")]
    MissingPrivateKey,

    /// Device token is not 64 hex characters (32 bytes).
    #[error("invalid device token: {0}")]
    InvalidDeviceToken(String),

    /// Serialized payload exceeds the protocol limit.
    #[error("payload is {len} bytes, limit is {limit}")]
    PayloadTooLarge { len: usize, limit: usize },

    /// Payload serialization error.
    #[error("payload serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using ApnsError.
pub type Result<T> = std::result::Result<T, ApnsError>;

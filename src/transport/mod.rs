//! Transport module - gateway connection handling.
//!
//! The send loop treats a connection as an opaque reliable duplex byte
//! channel obtained from a [`Connector`]. Any I/O error invalidates the
//! current session; the loop discards both halves of the stream and asks
//! the connector for a fresh one.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

mod tls;

pub use tls::{TlsConnector, TlsIdentity};

/// Well-known gateway addresses.
pub mod gateway {
    /// Production push gateway.
    pub const PRODUCTION: &str = "gateway.push.apple.com:2195";
    /// Sandbox push gateway for development builds.
    pub const SANDBOX: &str = "gateway.sandbox.push.apple.com:2195";
}

/// Dials the gateway and performs whatever handshake the transport needs.
///
/// Implemented by [`TlsConnector`] for real gateways; tests substitute
/// in-memory streams.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The established connection.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Establish a fresh connection to the gateway.
    async fn connect(&self) -> io::Result<Self::Stream>;
}

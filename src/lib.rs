//! # apns-client
//!
//! Async client for the legacy binary push notification protocol.
//!
//! The client holds one TLS connection to a push gateway, writes framed
//! notifications sequentially, and reconciles the gateway's only form of
//! feedback: an asynchronous 6-byte error response naming a previously
//! written notification, followed by a connection close that silently
//! discards everything written after the rejected one.
//!
//! ## Architecture
//!
//! - **Send loop**: a background task that assigns identifiers, frames and
//!   writes notifications, and multiplexes the error reader against new
//!   submissions.
//! - **Replay window**: the last N written notifications, retained so the
//!   tail the gateway discarded can be requeued after a rejection or a
//!   transport failure.
//! - **Failure stream**: best-effort reports of rejected notifications.
//!
//! ## Example
//!
//! ```ignore
//! use apns_client::{gateway, Client, ClientConfig, Notification, Payload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), apns_client::ApnsError> {
//!     let config = ClientConfig::new(gateway::PRODUCTION);
//!     let mut client = Client::from_files(config, "cert.pem", "key.pem")?;
//!
//!     let mut payload = Payload::default();
//!     payload.aps.alert = Some("It is a beautiful day in Gopherville.".into());
//!     payload.aps.badge = Some(1);
//!
//!     client.send(Notification::new(device_token, payload)).await;
//!
//!     while let Some(failed) = client.failures().recv().await {
//!         eprintln!("rejected {}: {}", failed.notification.identifier, failed.error);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod transport;

mod buffer;
mod client;

pub use client::{
    Client, ClientConfig, FailureStream, DEFAULT_BUFFER_CAPACITY, DEFAULT_CONNECT_RETRY_DELAY,
};
pub use error::ApnsError;
pub use protocol::{Notification, NotificationResult, Payload, Priority};
pub use transport::gateway;

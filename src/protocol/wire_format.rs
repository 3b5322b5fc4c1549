//! Wire format for the legacy binary interface.
//!
//! Outbound notifications use the framed command-2 format:
//!
//! ```text
//! ┌─────────┬──────────────┬────────────────────────────────────┐
//! │ Command │ Frame length │ Items                              │
//! │ 1 byte  │ 4 bytes BE   │ item id (1) + length (2 BE) + data │
//! └─────────┴──────────────┴────────────────────────────────────┘
//! ```
//!
//! Inbound traffic is at most a single 6-byte error response, after which
//! the gateway closes the stream:
//!
//! ```text
//! ┌─────────┬────────┬────────────┐
//! │ Command │ Status │ Identifier │
//! │ 1 byte  │ 1 byte │ 4 bytes BE │
//! └─────────┴────────┴────────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The gateway never acknowledges
//! success; the identifier in the error response is the only way to
//! correlate a rejection back to a written notification.

use std::fmt;

use bytes::{BufMut, BytesMut};

/// Command byte for outbound notification frames.
pub const FRAME_COMMAND: u8 = 2;

/// Command byte for inbound error responses.
pub const ERROR_RESPONSE_COMMAND: u8 = 8;

/// Error response size in bytes (fixed, exactly 6).
pub const ERROR_RESPONSE_SIZE: usize = 6;

/// Device token size after hex decoding.
pub const DEVICE_TOKEN_SIZE: usize = 32;

/// Maximum serialized payload size accepted by the gateway.
pub const MAX_PAYLOAD_SIZE: usize = 2048;

/// Item identifiers within a notification frame.
pub mod item {
    /// Device token (32 bytes).
    pub const DEVICE_TOKEN: u8 = 1;
    /// JSON payload.
    pub const PAYLOAD: u8 = 2;
    /// Notification identifier (4 bytes).
    pub const IDENTIFIER: u8 = 3;
    /// Expiration date (4 bytes, seconds since epoch, 0 = do not store).
    pub const EXPIRATION: u8 = 4;
    /// Delivery priority (1 byte).
    pub const PRIORITY: u8 = 5;
}

/// Append one item (id, length, data) to a frame body.
pub(crate) fn put_item(buf: &mut BytesMut, id: u8, data: &[u8]) {
    buf.put_u8(id);
    buf.put_u16(data.len() as u16);
    buf.put_slice(data);
}

/// Status code carried by an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No errors encountered (0).
    NoErrors,
    /// Processing error (1).
    ProcessingError,
    /// Missing device token (2).
    MissingDeviceToken,
    /// Missing topic (3).
    MissingTopic,
    /// Missing payload (4).
    MissingPayload,
    /// Invalid token size (5).
    InvalidTokenSize,
    /// Invalid topic size (6).
    InvalidTopicSize,
    /// Invalid payload size (7).
    InvalidPayloadSize,
    /// Invalid token (8).
    InvalidToken,
    /// The gateway is shutting down this connection (10).
    Shutdown,
    /// Unknown status (255, or any unrecognized code).
    Unknown,
}

impl Status {
    /// Map a raw status byte to its status code.
    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => Status::NoErrors,
            1 => Status::ProcessingError,
            2 => Status::MissingDeviceToken,
            3 => Status::MissingTopic,
            4 => Status::MissingPayload,
            5 => Status::InvalidTokenSize,
            6 => Status::InvalidTopicSize,
            7 => Status::InvalidPayloadSize,
            8 => Status::InvalidToken,
            10 => Status::Shutdown,
            _ => Status::Unknown,
        }
    }

    /// Raw status byte for this code.
    pub fn as_u8(self) -> u8 {
        match self {
            Status::NoErrors => 0,
            Status::ProcessingError => 1,
            Status::MissingDeviceToken => 2,
            Status::MissingTopic => 3,
            Status::MissingPayload => 4,
            Status::InvalidTokenSize => 5,
            Status::InvalidTopicSize => 6,
            Status::InvalidPayloadSize => 7,
            Status::InvalidToken => 8,
            Status::Shutdown => 10,
            Status::Unknown => 255,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::NoErrors => "no errors encountered",
            Status::ProcessingError => "processing error",
            Status::MissingDeviceToken => "missing device token",
            Status::MissingTopic => "missing topic",
            Status::MissingPayload => "missing payload",
            Status::InvalidTokenSize => "invalid token size",
            Status::InvalidTopicSize => "invalid topic size",
            Status::InvalidPayloadSize => "invalid payload size",
            Status::InvalidToken => "invalid token",
            Status::Shutdown => "shutdown",
            Status::Unknown => "unknown error",
        };
        f.write_str(text)
    }
}

/// Decoded 6-byte error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Command byte, always [`ERROR_RESPONSE_COMMAND`] in practice.
    pub command: u8,
    /// Why the gateway rejected the notification.
    pub status: Status,
    /// Identifier of the offending notification.
    pub identifier: u32,
}

impl ErrorResponse {
    /// Create an error response with the standard command byte.
    pub fn new(status: Status, identifier: u32) -> Self {
        Self {
            command: ERROR_RESPONSE_COMMAND,
            status,
            identifier,
        }
    }

    /// Decode an error response from its 6-byte wire form.
    pub fn decode(buf: &[u8; ERROR_RESPONSE_SIZE]) -> Self {
        Self {
            command: buf[0],
            status: Status::from_u8(buf[1]),
            identifier: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
        }
    }

    /// Encode the error response to its 6-byte wire form.
    pub fn encode(&self) -> [u8; ERROR_RESPONSE_SIZE] {
        let mut buf = [0u8; ERROR_RESPONSE_SIZE];
        buf[0] = self.command;
        buf[1] = self.status.as_u8();
        buf[2..6].copy_from_slice(&self.identifier.to_be_bytes());
        buf
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (status {}, identifier {})",
            self.status,
            self.status.as_u8(),
            self.identifier
        )
    }
}

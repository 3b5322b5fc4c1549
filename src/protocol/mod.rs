//! Protocol module - the legacy binary wire format.
//!
//! This module implements both directions of the protocol:
//! - notification frames (command 2, itemized body) going out
//! - the single 6-byte error response coming back

mod notification;
mod wire_format;

pub use notification::{
    Alert, AlertDict, Aps, Notification, NotificationResult, Payload, Priority,
};
pub use wire_format::{
    item, ErrorResponse, Status, DEVICE_TOKEN_SIZE, ERROR_RESPONSE_COMMAND, ERROR_RESPONSE_SIZE,
    FRAME_COMMAND, MAX_PAYLOAD_SIZE,
};

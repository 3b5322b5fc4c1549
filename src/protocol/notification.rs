//! Notification and payload types.
//!
//! A [`Notification`] pairs a device token with an APS payload and the
//! wire-level metadata (identifier, expiration, priority). [`Notification::to_frame`]
//! produces the framed byte sequence the gateway expects.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::wire_format::{
    item, put_item, DEVICE_TOKEN_SIZE, FRAME_COMMAND, MAX_PAYLOAD_SIZE,
};
use super::ErrorResponse;
use crate::error::{ApnsError, Result};

/// Delivery priority for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Deliver immediately (10).
    #[default]
    Immediate,
    /// Deliver at a time that conserves power on the device (5).
    PowerConserving,
}

impl Priority {
    /// Raw priority byte for the wire.
    pub fn as_u8(self) -> u8 {
        match self {
            Priority::Immediate => 10,
            Priority::PowerConserving => 5,
        }
    }
}

/// Alert content: either bare text or a structured dictionary.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Alert {
    /// Plain alert text.
    Text(String),
    /// Structured alert with localization keys.
    Dict(AlertDict),
}

impl From<String> for Alert {
    fn from(text: String) -> Self {
        Alert::Text(text)
    }
}

impl From<&str> for Alert {
    fn from(text: &str) -> Self {
        Alert::Text(text.to_string())
    }
}

/// Structured alert dictionary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertDict {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(rename = "loc-key", skip_serializing_if = "Option::is_none")]
    pub loc_key: Option<String>,
    #[serde(rename = "loc-args", skip_serializing_if = "Option::is_none")]
    pub loc_args: Option<Vec<String>>,
    #[serde(rename = "action-loc-key", skip_serializing_if = "Option::is_none")]
    pub action_loc_key: Option<String>,
    #[serde(rename = "launch-image", skip_serializing_if = "Option::is_none")]
    pub launch_image: Option<String>,
}

/// The `aps` dictionary of a payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<Alert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(rename = "content-available", skip_serializing_if = "Option::is_none")]
    pub content_available: Option<u8>,
}

/// JSON payload of a notification.
///
/// Custom top-level keys live in `custom` and are flattened next to `aps`
/// when serialized.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Payload {
    pub aps: Aps,
    #[serde(flatten)]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

/// A push notification to one device.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Target device token, 64 hex characters.
    pub device_token: String,
    /// Wire identifier. 0 means "assign one for me"; the send loop replaces
    /// it before the notification is written. Preset nonzero values are
    /// written verbatim.
    pub identifier: u32,
    /// Expiration as seconds since the epoch. `None` is written as 0,
    /// meaning the gateway does not store the notification.
    pub expiration: Option<u32>,
    /// Delivery priority.
    pub priority: Priority,
    /// JSON payload.
    pub payload: Payload,
}

impl Notification {
    /// Create a notification with an unassigned identifier, no expiration,
    /// and immediate priority.
    pub fn new(device_token: impl Into<String>, payload: Payload) -> Self {
        Self {
            device_token: device_token.into(),
            identifier: 0,
            expiration: None,
            priority: Priority::default(),
            payload,
        }
    }

    /// Set a caller-chosen identifier.
    pub fn identifier(mut self, identifier: u32) -> Self {
        self.identifier = identifier;
        self
    }

    /// Set the expiration (seconds since the epoch).
    pub fn expiration(mut self, expiration: u32) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Set the delivery priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Encode the notification into its framed wire form.
    ///
    /// # Errors
    ///
    /// Fails if the device token is not 32 hex-encoded bytes or the
    /// serialized payload exceeds [`MAX_PAYLOAD_SIZE`].
    pub fn to_frame(&self) -> Result<Bytes> {
        let token = hex::decode(&self.device_token)
            .map_err(|_| ApnsError::InvalidDeviceToken(self.device_token.clone()))?;
        if token.len() != DEVICE_TOKEN_SIZE {
            return Err(ApnsError::InvalidDeviceToken(self.device_token.clone()));
        }

        let payload = serde_json::to_vec(&self.payload)?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ApnsError::PayloadTooLarge {
                len: payload.len(),
                limit: MAX_PAYLOAD_SIZE,
            });
        }

        let mut body = BytesMut::with_capacity(64 + payload.len());
        put_item(&mut body, item::DEVICE_TOKEN, &token);
        put_item(&mut body, item::PAYLOAD, &payload);
        put_item(&mut body, item::IDENTIFIER, &self.identifier.to_be_bytes());
        put_item(
            &mut body,
            item::EXPIRATION,
            &self.expiration.unwrap_or(0).to_be_bytes(),
        );
        put_item(&mut body, item::PRIORITY, &[self.priority.as_u8()]);

        let mut frame = BytesMut::with_capacity(5 + body.len());
        frame.put_u8(FRAME_COMMAND);
        frame.put_u32(body.len() as u32);
        frame.put_slice(&body);
        Ok(frame.freeze())
    }
}

/// A notification the gateway rejected, paired with the reason.
#[derive(Debug, Clone)]
pub struct NotificationResult {
    /// The rejected notification as it was written to the wire.
    pub notification: Notification,
    /// The decoded error response that identified it.
    pub error: ErrorResponse,
}

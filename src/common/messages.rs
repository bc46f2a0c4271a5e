//! Canonical message types for bridge communication.
//!
//! These types cross between the Skype session, the relay core and the
//! Matrix side.

use bytes::Bytes;

use crate::common::error::EventDecodeError;
use crate::common::types::{OutboundImage, RawEvent};

/// Payload handed to the bridge framework for every relayed message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomMessagePayload {
    /// Display key of the room token.
    pub room_id: String,
    /// The room token itself, for metadata lookups.
    pub room_token: String,
    /// Sender token. `None` means the message was sent by the puppet.
    pub sender_id: Option<String>,
    pub sender_name: Option<String>,
    pub avatar_url: Option<String>,
    pub text: String,
    pub buffer: Option<Bytes>,
    pub mimetype: Option<String>,
}

/// Notification delivered by the Skype event stream.
#[derive(Debug)]
pub enum SessionEvent {
    /// A message resource, or the reason it could not be decoded.
    Event(Result<RawEvent, EventDecodeError>),
    /// Non-fatal stream error, reported as a status message.
    Error(String),
}

/// Command issued by the bridge framework for the Skype side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCommand {
    /// Send text into the room identified by `room_token`.
    SendText { room_token: String, text: String },
    /// Send an image into the room identified by `room_token`.
    SendImage {
        room_token: String,
        image: OutboundImage,
    },
}

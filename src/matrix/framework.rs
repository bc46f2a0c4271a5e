//! Callback contracts between the relay core and the bridge framework.
//!
//! [`BridgeFramework`] is what the core emits into; [`ThirdPartyClient`] is
//! what the framework calls back into. Room and user ids crossing either
//! trait are tokens from `bridge::identity`.

use async_trait::async_trait;

use crate::common::error::BridgeResult;
use crate::common::types::{OutboundImage, RoomData, UserData};
use crate::common::RoomMessagePayload;

/// Entry points of the bridge framework used by the relay.
#[async_trait]
pub trait BridgeFramework: Send + Sync {
    /// Deliver a text message into the room named by `payload.room_id`.
    async fn handle_third_party_room_message(&self, payload: RoomMessagePayload) -> BridgeResult<()>;

    /// Deliver an image; `payload.buffer` and `payload.mimetype` are set.
    async fn handle_third_party_room_image_message(
        &self,
        payload: RoomMessagePayload,
    ) -> BridgeResult<()>;

    /// Surface a Skype-side status or error to the user.
    async fn send_status_message(&self, text: &str) -> BridgeResult<()>;
}

/// Callbacks the Skype side implements for the framework.
#[async_trait]
pub trait ThirdPartyClient: Send + Sync {
    /// Display metadata for the user behind `token`.
    async fn get_third_party_user_data_by_id(&self, token: &str) -> BridgeResult<UserData>;

    /// Display metadata for the conversation behind `token`.
    async fn get_third_party_room_data_by_id(&self, token: &str) -> BridgeResult<RoomData>;

    /// Send text typed by the puppet user.
    async fn send_message_as_puppet_to_third_party_room_with_id(
        &self,
        token: &str,
        text: &str,
    ) -> BridgeResult<()>;

    /// Send an image posted by the puppet user.
    async fn send_image_message_as_puppet_to_third_party_room_with_id(
        &self,
        token: &str,
        image: &OutboundImage,
    ) -> BridgeResult<()>;
}

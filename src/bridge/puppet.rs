//! The Skype side of the bridge: session startup and framework callbacks.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::bridge::directory::ContactDirectory;
use crate::bridge::identity;
use crate::bridge::outbound::OutboundAdapter;
use crate::bridge::session::Session;
use crate::bridge::transfer::Fetcher;
use crate::common::error::{BridgeResult, SkypeResult};
use crate::common::types::{ConversationKind, OutboundImage, RoomData, UserData};
use crate::common::{BridgeCommand, SessionEvent};
use crate::matrix::ThirdPartyClient;
use crate::skype::SkypeApi;

pub const DIRECT_MESSAGE_TOPIC: &str = "Skype Direct Message";
pub const GROUP_CHAT_TOPIC: &str = "Skype Group Chat";

/// A running Skype puppet.
pub struct SkypePuppet {
    session: Arc<Session>,
    outbound: OutboundAdapter,
}

/// Load contacts and start the event stream for an authenticated session.
///
/// Events flow into `events` until the returned task ends.
pub async fn init_third_party_client(
    api: Arc<dyn SkypeApi>,
    avatar_url_template: &str,
    fetcher: Arc<dyn Fetcher>,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> SkypeResult<(Arc<SkypePuppet>, JoinHandle<SkypeResult<()>>)> {
    let contacts = api.get_contacts().await?;
    info!("Got {} contacts", contacts.len());

    let directory = ContactDirectory::new(contacts, avatar_url_template);
    let session = Arc::new(Session::new(api, directory));
    let listener = session.api.listen(events);

    Ok((Arc::new(SkypePuppet::new(session, fetcher)), listener))
}

impl SkypePuppet {
    pub fn new(session: Arc<Session>, fetcher: Arc<dyn Fetcher>) -> Self {
        let outbound = OutboundAdapter::new(session.clone(), fetcher);
        Self { session, outbound }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Carry out a command from the bridge framework.
    pub async fn handle_command(&self, command: BridgeCommand) -> BridgeResult<()> {
        match command {
            BridgeCommand::SendText { room_token, text } => {
                self.send_message_as_puppet_to_third_party_room_with_id(&room_token, &text)
                    .await
            }
            BridgeCommand::SendImage { room_token, image } => {
                self.send_image_message_as_puppet_to_third_party_room_with_id(&room_token, &image)
                    .await
            }
        }
    }
}

#[async_trait]
impl ThirdPartyClient for SkypePuppet {
    async fn get_third_party_user_data_by_id(&self, token: &str) -> BridgeResult<UserData> {
        let raw = identity::decode(token)?;
        Ok(self.session.directory.user_data(&raw))
    }

    async fn get_third_party_room_data_by_id(&self, token: &str) -> BridgeResult<RoomData> {
        let id = identity::decode(token)?;
        let markup = &self.session.markup;

        if let Some(contact) = self.session.directory.get_contact(&id) {
            return Ok(RoomData {
                name: markup.from_third_party_markup(&contact.display_name),
                topic: DIRECT_MESSAGE_TOPIC.to_string(),
            });
        }

        debug!(conversation = %id, "Room is not a contact, asking Skype");
        let conversation = self.session.api.get_conversation(&id).await?;
        let name = if conversation.topic.trim().is_empty() {
            conversation.id.clone()
        } else {
            markup.from_third_party_markup(&conversation.topic)
        };
        let topic = match conversation.kind {
            ConversationKind::Direct => DIRECT_MESSAGE_TOPIC,
            ConversationKind::Group => GROUP_CHAT_TOPIC,
        };

        Ok(RoomData {
            name,
            topic: topic.to_string(),
        })
    }

    async fn send_message_as_puppet_to_third_party_room_with_id(
        &self,
        token: &str,
        text: &str,
    ) -> BridgeResult<()> {
        self.outbound.send_text(token, text).await
    }

    async fn send_image_message_as_puppet_to_third_party_room_with_id(
        &self,
        token: &str,
        image: &OutboundImage,
    ) -> BridgeResult<()> {
        self.outbound.send_image_message(token, image).await
    }
}

//! Relay pipeline: Skype events into bridge framework calls.
//!
//! Events are handled one at a time, in stream order, each to completion
//! (including any image download) before the next is classified.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bridge::classifier::{classify, Classification};
use crate::bridge::identity;
use crate::bridge::session::Session;
use crate::bridge::transfer::Fetcher;
use crate::common::error::BridgeResult;
use crate::common::types::{ImageEvent, TextEvent};
use crate::common::{RoomMessagePayload, SessionEvent};
use crate::matrix::BridgeFramework;

/// Forwards classified Skype events to the bridge framework.
pub struct Relay {
    session: Arc<Session>,
    framework: Arc<dyn BridgeFramework>,
    fetcher: Arc<dyn Fetcher>,
}

impl Relay {
    pub fn new(
        session: Arc<Session>,
        framework: Arc<dyn BridgeFramework>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            session,
            framework,
            fetcher,
        }
    }

    /// Handle one notification from the event stream.
    ///
    /// Failures are logged; the stream always continues.
    pub async fn process(&self, event: SessionEvent) {
        let result = match event {
            SessionEvent::Event(raw) => {
                let classification = classify(raw, &self.session.suppressor);
                self.relay(classification).await
            }
            SessionEvent::Error(message) => {
                warn!("Skype stream error: {}", message);
                self.framework
                    .send_status_message(&format!("Skype error: {}", message))
                    .await
            }
        };

        if let Err(e) = result {
            error!("Failed to relay Skype event: {}", e);
        }
    }

    /// Relay a classified event.
    pub async fn relay(&self, classification: Classification) -> BridgeResult<()> {
        match classification {
            Classification::Inbound(text) => self.relay_text(text, false).await,
            Classification::SelfEcho(text) => self.relay_text(text, true).await,
            Classification::InboundImage(image) => self.relay_image(image).await,
            Classification::SuppressedImage | Classification::Ignored => Ok(()),
        }
    }

    async fn relay_text(&self, event: TextEvent, from_puppet: bool) -> BridgeResult<()> {
        let sender = if from_puppet {
            None
        } else {
            event.sender.raw.as_deref()
        };
        let mut payload = self.payload(&event.conversation, sender);
        payload.text = self.session.markup.from_third_party_markup(&event.content);

        info!(
            conversation = %event.conversation,
            sender = ?payload.sender_name,
            "Skype -> Matrix: {}",
            payload.text
        );
        self.framework.handle_third_party_room_message(payload).await
    }

    async fn relay_image(&self, event: ImageEvent) -> BridgeResult<()> {
        let mut payload = self.payload(&event.conversation, event.sender.raw.as_deref());
        payload.text = event.original_file_name.clone();

        let url = event.download_url();
        let auth = self.session.api.download_auth();
        match self.fetcher.fetch(&url, &auth).await {
            Ok(media) => {
                info!(
                    conversation = %event.conversation,
                    filename = %event.original_file_name,
                    "Skype -> Matrix: image"
                );
                payload.buffer = Some(media.buffer);
                payload.mimetype = Some(media.content_type);
                self.framework.handle_third_party_room_image_message(payload).await
            }
            Err(e) => {
                warn!(
                    filename = %event.original_file_name,
                    "Image download failed, relaying link instead: {}",
                    e
                );
                payload.text = image_fallback_text(&event.original_file_name, &url);
                self.framework.handle_third_party_room_message(payload).await
            }
        }
    }

    /// Room and sender identity for a message. `sender` of `None` is the puppet.
    fn payload(&self, conversation: &str, sender: Option<&str>) -> RoomMessagePayload {
        let room_token = identity::encode(conversation);
        let mut payload = RoomMessagePayload {
            room_id: identity::display_key(&room_token),
            room_token,
            ..Default::default()
        };

        if let Some(raw) = sender {
            let user = self.session.directory.user_data(raw);
            payload.sender_id = Some(identity::encode(raw));
            payload.sender_name = Some(user.sender_name);
            payload.avatar_url = user.avatar_url;
        } else {
            debug!(conversation, "Relaying as puppet");
        }
        payload
    }
}

/// Text relayed in place of an image that could not be downloaded.
pub fn image_fallback_text(filename: &str, url: &str) -> String {
    format!("[Image] ({}) {}", filename, url)
}

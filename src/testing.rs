//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::echo::EchoSuppressor;
use crate::bridge::transfer::{DownloadAuth, Fetcher};
use crate::common::error::{BridgeResult, SkypeError, SkypeResult, TransferError};
use crate::common::types::{ContactRecord, ConversationRef, Media};
use crate::common::{RoomMessagePayload, SessionEvent};
use crate::matrix::BridgeFramework;
use crate::skype::{ImageUpload, SkypeApi};

/// An image upload as seen by [`FakeSkype`].
#[derive(Debug, Clone)]
pub struct SentImage {
    pub upload: ImageUpload,
    pub conversation: String,
    /// Bytes found at the upload path.
    pub contents: Vec<u8>,
    /// Pending suppressor entries for the name when the upload was issued.
    pub pending_at_send: usize,
}

#[derive(Default)]
pub struct FakeSkype {
    pub contacts: Vec<ContactRecord>,
    pub conversations: HashMap<String, ConversationRef>,
    pub fail_images: bool,
    sent: Mutex<Vec<(String, String)>>,
    images: Mutex<Vec<SentImage>>,
    suppressor: OnceLock<Arc<EchoSuppressor>>,
}

impl FakeSkype {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a suppressor so uploads record its state.
    pub fn watch(&self, suppressor: Arc<EchoSuppressor>) {
        let _ = self.suppressor.set(suppressor);
    }

    /// `(content, conversation)` of every text send.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn images(&self) -> Vec<SentImage> {
        self.images.lock().unwrap().clone()
    }
}

#[async_trait]
impl SkypeApi for FakeSkype {
    fn listen(&self, _events: mpsc::UnboundedSender<SessionEvent>) -> JoinHandle<SkypeResult<()>> {
        tokio::spawn(async { Ok(()) })
    }

    async fn get_contacts(&self) -> SkypeResult<Vec<ContactRecord>> {
        Ok(self.contacts.clone())
    }

    async fn send_message(&self, content: &str, conversation_id: &str) -> SkypeResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((content.to_string(), conversation_id.to_string()));
        Ok(())
    }

    async fn send_image(&self, image: &ImageUpload, conversation_id: &str) -> SkypeResult<()> {
        let pending_at_send = self
            .suppressor
            .get()
            .map(|s| s.pending_count(&image.name))
            .unwrap_or(0);
        let contents = std::fs::read(&image.file).unwrap_or_default();
        self.images.lock().unwrap().push(SentImage {
            upload: image.clone(),
            conversation: conversation_id.to_string(),
            contents,
            pending_at_send,
        });

        if self.fail_images {
            Err(SkypeError::Status {
                endpoint: "objects",
                status: 500,
            })
        } else {
            Ok(())
        }
    }

    async fn get_conversation(&self, id: &str) -> SkypeResult<ConversationRef> {
        self.conversations
            .get(id)
            .cloned()
            .ok_or(SkypeError::Status {
                endpoint: "conversation",
                status: 404,
            })
    }

    fn download_auth(&self) -> DownloadAuth {
        DownloadAuth {
            headers: vec![("Authorization".to_string(), "skype_token fake".to_string())],
            cookies: None,
        }
    }
}

type FetchLog = Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>;

pub struct FakeFetcher {
    response: Option<Media>,
    requests: FetchLog,
}

impl FakeFetcher {
    pub fn returning(buffer: &'static [u8], content_type: &str) -> Self {
        Self {
            response: Some(Media {
                buffer: Bytes::from_static(buffer),
                content_type: content_type.to_string(),
            }),
            requests: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            requests: Arc::default(),
        }
    }

    /// `(url, headers)` of every fetch.
    pub fn requests(&self) -> FetchLog {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str, auth: &DownloadAuth) -> Result<Media, TransferError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), auth.headers.clone()));
        self.response.clone().ok_or_else(|| TransferError::Status {
            url: url.to_string(),
            status: 502,
        })
    }
}

#[derive(Default)]
pub struct FakeFramework {
    messages: Mutex<Vec<RoomMessagePayload>>,
    images: Mutex<Vec<RoomMessagePayload>>,
    statuses: Mutex<Vec<String>>,
}

impl FakeFramework {
    pub fn messages(&self) -> Vec<RoomMessagePayload> {
        self.messages.lock().unwrap().clone()
    }

    pub fn images(&self) -> Vec<RoomMessagePayload> {
        self.images.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeFramework for FakeFramework {
    async fn handle_third_party_room_message(&self, payload: RoomMessagePayload) -> BridgeResult<()> {
        self.messages.lock().unwrap().push(payload);
        Ok(())
    }

    async fn handle_third_party_room_image_message(
        &self,
        payload: RoomMessagePayload,
    ) -> BridgeResult<()> {
        self.images.lock().unwrap().push(payload);
        Ok(())
    }

    async fn send_status_message(&self, text: &str) -> BridgeResult<()> {
        self.statuses.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

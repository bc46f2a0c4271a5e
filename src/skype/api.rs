//! The Skype session as seen by the bridge core.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::transfer::DownloadAuth;
use crate::common::error::SkypeResult;
use crate::common::types::{ContactRecord, ConversationRef};
use crate::common::SessionEvent;

/// Image file handed to [`SkypeApi::send_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file: PathBuf,
    pub name: String,
}

/// An authenticated Skype session.
#[async_trait]
pub trait SkypeApi: Send + Sync {
    /// Start delivering events into `events`.
    ///
    /// The task ends with `Ok` once the receiver is dropped, or with the
    /// error that terminated the stream.
    fn listen(&self, events: mpsc::UnboundedSender<SessionEvent>) -> JoinHandle<SkypeResult<()>>;

    async fn get_contacts(&self) -> SkypeResult<Vec<ContactRecord>>;

    /// Send rich-text `content` into a conversation.
    async fn send_message(&self, content: &str, conversation_id: &str) -> SkypeResult<()>;

    async fn send_image(&self, image: &ImageUpload, conversation_id: &str) -> SkypeResult<()>;

    async fn get_conversation(&self, id: &str) -> SkypeResult<ConversationRef>;

    /// Credentials for downloading media shared in this session.
    fn download_auth(&self) -> DownloadAuth;
}

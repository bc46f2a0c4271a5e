//! Shared types used across the application.

use std::path::PathBuf;

use bytes::Bytes;

/// A Skype contact, loaded once per session.
///
/// A contact answers to both its person id and its MRI ("routing address").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    pub person_id: String,
    pub mri: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl ContactRecord {
    /// Whether `id` names this contact in either identifier form.
    pub fn matches(&self, id: &str) -> bool {
        self.person_id == id || self.mri == id
    }
}

/// Whether a conversation is one-to-one or a group thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Direct,
    Group,
}

/// A Skype conversation as reported by the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRef {
    pub id: String,
    pub kind: ConversationKind,
    pub topic: String,
}

/// Sender of a raw event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    /// Raw identifier (e.g. `8:live:alice`). `None` once scrubbed.
    pub raw: Option<String>,
    /// Whether the sender is the authenticated account.
    pub is_self: bool,
}

/// A plain or rich text message resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEvent {
    pub sender: Sender,
    pub conversation: String,
    pub content: String,
}

/// An image object shared into a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEvent {
    pub sender: Sender,
    pub conversation: String,
    /// Object URI on the media service.
    pub uri: String,
    pub original_file_name: String,
}

impl ImageEvent {
    /// URL of the full-size rendition of the image.
    pub fn download_url(&self) -> String {
        format!("{}/views/imgpsh_fullsize", self.uri.trim_end_matches('/'))
    }
}

/// A Skype message resource, decoded once at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// `Text` or `RichText`.
    Text(TextEvent),
    /// `RichText/UriObject`.
    Image(ImageEvent),
    /// Any other resource type.
    Other { resource_type: String },
}

/// Downloaded binary content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub buffer: Bytes,
    pub content_type: String,
}

/// Display metadata for a Skype user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserData {
    pub sender_name: String,
    pub avatar_url: Option<String>,
}

/// Display metadata for a bridged room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomData {
    pub name: String,
    pub topic: String,
}

/// Image handed to the Skype side by the bridge framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundImage {
    /// Where the image can be downloaded from.
    pub url: String,
    /// Caption, used as the upstream file name.
    pub text: String,
}

/// An outbound image staged on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    pub local_file_path: PathBuf,
    pub filename: String,
    pub source_url: String,
}

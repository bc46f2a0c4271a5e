//! Outbound command adapter: bridge commands into Skype sends.

use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::bridge::identity;
use crate::bridge::markup::{escape_html, ECHO_MARKER};
use crate::bridge::session::Session;
use crate::bridge::transfer::{DownloadAuth, Fetcher};
use crate::common::error::BridgeResult;
use crate::common::types::{OutboundImage, StagedImage};
use crate::skype::ImageUpload;

/// File name used when an image arrives without a caption.
const DEFAULT_IMAGE_NAME: &str = "image";

/// An image written to a temporary file; the file is removed on drop.
#[derive(Debug)]
pub struct StagedUpload {
    pub image: StagedImage,
    _file: NamedTempFile,
}

/// Translates puppet sends into Skype API calls.
pub struct OutboundAdapter {
    session: Arc<Session>,
    fetcher: Arc<dyn Fetcher>,
}

impl OutboundAdapter {
    pub fn new(session: Arc<Session>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { session, fetcher }
    }

    /// Send text into the conversation behind `room_token`.
    pub async fn send_text(&self, room_token: &str, text: &str) -> BridgeResult<()> {
        let conversation = identity::decode(room_token)?;
        let content = self.session.markup.to_third_party_markup(text);

        info!(conversation = %conversation, "Matrix -> Skype: {}", text);
        self.session.api.send_message(&content, &conversation).await?;
        Ok(())
    }

    /// Upload a staged image into the conversation behind `room_token`.
    ///
    /// The file name is registered with the echo suppressor before the
    /// upload is issued. If the upload fails the registration is undone and
    /// a link to the original is sent instead.
    pub async fn send_image(&self, room_token: &str, image: &StagedImage) -> BridgeResult<()> {
        let conversation = identity::decode(room_token)?;
        let suppressor = &self.session.suppressor;

        suppressor.register(&image.filename);
        let upload = ImageUpload {
            file: image.local_file_path.clone(),
            name: image.filename.clone(),
        };

        match self.session.api.send_image(&upload, &conversation).await {
            Ok(()) => {
                info!(
                    conversation = %conversation,
                    filename = %image.filename,
                    "Matrix -> Skype: image"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    conversation = %conversation,
                    filename = %image.filename,
                    "Image upload failed, sending link instead: {}",
                    e
                );
                suppressor.rollback(&image.filename);
                let content = image_link_markup(&image.source_url, &image.filename);
                self.session.api.send_message(&content, &conversation).await?;
                Ok(())
            }
        }
    }

    /// Download an image offered by the bridge into a temporary file.
    pub async fn stage_image(&self, image: &OutboundImage) -> BridgeResult<StagedUpload> {
        let media = self
            .fetcher
            .fetch(&image.url, &DownloadAuth::anonymous())
            .await?;

        let file = tempfile::Builder::new()
            .prefix("skype-puppet-")
            .tempfile()?;
        tokio::fs::write(file.path(), &media.buffer).await?;
        debug!(path = %file.path().display(), bytes = media.buffer.len(), "Staged outbound image");

        let filename = if image.text.trim().is_empty() {
            DEFAULT_IMAGE_NAME.to_string()
        } else {
            image.text.clone()
        };

        Ok(StagedUpload {
            image: StagedImage {
                local_file_path: file.path().to_path_buf(),
                filename,
                source_url: image.url.clone(),
            },
            _file: file,
        })
    }

    /// Stage and send an image; the temporary file is gone afterwards.
    pub async fn send_image_message(&self, room_token: &str, image: &OutboundImage) -> BridgeResult<()> {
        identity::decode(room_token)?;
        let staged = self.stage_image(image).await?;
        self.send_image(room_token, &staged.image).await
    }
}

/// Skype markup linking to an image that could not be uploaded.
pub fn image_link_markup(url: &str, filename: &str) -> String {
    format!(
        "[Image] <a href=\"{}\">{}</a>{}",
        escape_html(url),
        escape_html(filename),
        ECHO_MARKER
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::directory::ContactDirectory;
    use crate::common::error::{BridgeError, IdentityError};
    use crate::testing::{FakeFetcher, FakeSkype};

    fn adapter(skype: FakeSkype, fetcher: FakeFetcher) -> (OutboundAdapter, Arc<FakeSkype>, Arc<Session>) {
        let skype = Arc::new(skype);
        let directory = ContactDirectory::new(Vec::new(), "https://a.example/%user");
        let session = Arc::new(Session::new(skype.clone(), directory));
        skype.watch(session.suppressor.clone());
        (
            OutboundAdapter::new(session.clone(), Arc::new(fetcher)),
            skype,
            session,
        )
    }

    fn staged(name: &str, url: &str) -> StagedImage {
        StagedImage {
            local_file_path: std::env::temp_dir().join("does-not-matter.png"),
            filename: name.to_string(),
            source_url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_text_decodes_and_marks() {
        let (adapter, skype, _) = adapter(FakeSkype::new(), FakeFetcher::failing());
        let token = identity::encode("19:convo@thread");

        tokio_test::assert_ok!(adapter.send_text(&token, "a & b").await);

        assert_eq!(
            skype.sent(),
            vec![("a &amp; b\u{feff}".to_string(), "19:convo@thread".to_string())]
        );
    }

    #[tokio::test]
    async fn test_send_text_bad_token() {
        let (adapter, skype, _) = adapter(FakeSkype::new(), FakeFetcher::failing());

        let result = adapter.send_text("%%%", "hi").await;

        assert!(matches!(
            result,
            Err(BridgeError::Identity(IdentityError::InvalidBase64(_)))
        ));
        assert!(skype.sent().is_empty());
    }

    #[tokio::test]
    async fn test_registration_precedes_upload() {
        let (adapter, skype, session) = adapter(FakeSkype::new(), FakeFetcher::failing());
        let token = identity::encode("8:live:bob");

        tokio_test::assert_ok!(adapter.send_image(&token, &staged("cat.png", "https://x/cat")).await);

        let images = skype.images();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].pending_at_send, 1);
        assert_eq!(images[0].conversation, "8:live:bob");
        // Left pending until the echo arrives
        assert_eq!(session.suppressor.pending_count("cat.png"), 1);
        assert!(skype.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failed_upload_rolls_back_and_sends_link() {
        let mut skype = FakeSkype::new();
        skype.fail_images = true;
        let (adapter, skype, session) = adapter(skype, FakeFetcher::failing());
        let token = identity::encode("19:convo@thread");

        let result = adapter
            .send_image(&token, &staged("a<b>.png", "https://x/m?a=1&b=2"))
            .await;

        tokio_test::assert_ok!(result);
        assert_eq!(session.suppressor.pending_count("a<b>.png"), 0);
        let sent = skype.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].0,
            "[Image] <a href=\"https://x/m?a=1&amp;b=2\">a&lt;b&gt;.png</a>\u{feff}"
        );
        assert_eq!(sent[0].1, "19:convo@thread");
    }

    #[tokio::test]
    async fn test_rollback_keeps_earlier_registrations() {
        let mut skype = FakeSkype::new();
        skype.fail_images = true;
        let (adapter, _, session) = adapter(skype, FakeFetcher::failing());
        session.suppressor.register("cat.png");

        let token = identity::encode("19:convo@thread");
        tokio_test::assert_ok!(adapter.send_image(&token, &staged("cat.png", "https://x")).await);

        assert_eq!(session.suppressor.pending_count("cat.png"), 1);
    }

    #[tokio::test]
    async fn test_send_image_message_stages_file() {
        let (adapter, skype, _) = adapter(FakeSkype::new(), FakeFetcher::returning(b"jpeg", "image/jpeg"));
        let token = identity::encode("19:convo@thread");
        let image = OutboundImage {
            url: "https://matrix.example.org/_matrix/media/v3/download/example.org/abc".to_string(),
            text: "holiday.jpg".to_string(),
        };

        tokio_test::assert_ok!(adapter.send_image_message(&token, &image).await);

        let images = skype.images();
        assert_eq!(images[0].upload.name, "holiday.jpg");
        assert_eq!(images[0].contents, b"jpeg");
        assert!(!images[0].upload.file.exists());
    }

    #[tokio::test]
    async fn test_staging_failure_sends_nothing() {
        let (adapter, skype, session) = adapter(FakeSkype::new(), FakeFetcher::failing());
        let token = identity::encode("19:convo@thread");
        let image = OutboundImage {
            url: "https://x/y".to_string(),
            text: String::new(),
        };

        let result = adapter.send_image_message(&token, &image).await;

        assert!(matches!(result, Err(BridgeError::Transfer(_))));
        assert!(skype.images().is_empty());
        assert_eq!(session.suppressor.pending_count(DEFAULT_IMAGE_NAME), 0);
    }
}

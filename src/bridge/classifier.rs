//! Classification of raw Skype events.
//!
//! The upstream stream is noisy: it shows our own text sends (tagged or not),
//! re-delivers our own image uploads as ordinary inbound images, and carries
//! resource types the bridge has no use for. Every event is sorted into one
//! of the [`Classification`] variants before anything is relayed.

use tracing::{debug, warn};

use crate::bridge::echo::EchoSuppressor;
use crate::bridge::markup::ECHO_MARKER;
use crate::common::error::EventDecodeError;
use crate::common::types::{ImageEvent, RawEvent, TextEvent};

/// What to do with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Text from someone else.
    Inbound(TextEvent),
    /// Text the account sent from another client; relayed as the puppet.
    SelfEcho(TextEvent),
    /// Image to relay. A self-sent image arrives with its sender scrubbed.
    InboundImage(ImageEvent),
    /// Our own upload coming back.
    SuppressedImage,
    /// Nothing to relay.
    Ignored,
}

/// Classify one decoded event. Undecodable events are ignored.
pub fn classify(
    event: Result<RawEvent, EventDecodeError>,
    suppressor: &EchoSuppressor,
) -> Classification {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            warn!("Ignoring malformed Skype event: {}", e);
            return Classification::Ignored;
        }
    };

    match event {
        RawEvent::Text(text) => classify_text(text),
        RawEvent::Image(image) => classify_image(image, suppressor),
        RawEvent::Other { resource_type } => {
            debug!(resource_type = %resource_type, "Ignoring Skype resource");
            Classification::Ignored
        }
    }
}

fn classify_text(text: TextEvent) -> Classification {
    if !text.sender.is_self {
        return Classification::Inbound(text);
    }

    if text.content.ends_with(ECHO_MARKER) {
        debug!(conversation = %text.conversation, "Ignoring echo of relayed message");
        Classification::Ignored
    } else {
        Classification::SelfEcho(text)
    }
}

fn classify_image(mut image: ImageEvent, suppressor: &EchoSuppressor) -> Classification {
    if suppressor.try_consume(&image.original_file_name) {
        debug!(
            filename = %image.original_file_name,
            "Suppressed echo of outbound image"
        );
        return Classification::SuppressedImage;
    }

    if image.sender.is_self {
        // Uploaded by another client of this account
        image.sender.raw = None;
    }
    Classification::InboundImage(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Sender;

    fn text(is_self: bool, content: &str) -> RawEvent {
        RawEvent::Text(TextEvent {
            sender: Sender {
                raw: Some("8:live:alice".to_string()),
                is_self,
            },
            conversation: "19:convo@thread.skype".to_string(),
            content: content.to_string(),
        })
    }

    fn image(is_self: bool, name: &str) -> RawEvent {
        RawEvent::Image(ImageEvent {
            sender: Sender {
                raw: Some("8:live:alice".to_string()),
                is_self,
            },
            conversation: "19:convo@thread.skype".to_string(),
            uri: "https://api.asm.skype.com/v1/objects/0-abc".to_string(),
            original_file_name: name.to_string(),
        })
    }

    #[test]
    fn test_text_from_others_is_inbound() {
        let result = classify(Ok(text(false, "hi")), &EchoSuppressor::new());
        assert!(matches!(result, Classification::Inbound(t) if t.content == "hi"));
    }

    #[test]
    fn test_marker_decides_self_text() {
        let suppressor = EchoSuppressor::new();

        let tagged = classify(Ok(text(true, "hi\u{feff}")), &suppressor);
        assert_eq!(tagged, Classification::Ignored);

        let untagged = classify(Ok(text(true, "hi")), &suppressor);
        assert!(matches!(untagged, Classification::SelfEcho(t) if t.content == "hi"));
    }

    #[test]
    fn test_marker_ignored_for_other_senders() {
        let result = classify(Ok(text(false, "hi\u{feff}")), &EchoSuppressor::new());
        assert!(matches!(result, Classification::Inbound(_)));
    }

    #[test]
    fn test_registered_image_is_suppressed() {
        let suppressor = EchoSuppressor::new();
        suppressor.register("cat.png");

        assert_eq!(
            classify(Ok(image(true, "cat.png")), &suppressor),
            Classification::SuppressedImage
        );
        // Entry consumed: the next one is genuine
        assert!(matches!(
            classify(Ok(image(false, "cat.png")), &suppressor),
            Classification::InboundImage(_)
        ));
    }

    #[test]
    fn test_unregistered_image_is_inbound() {
        let suppressor = EchoSuppressor::new();
        suppressor.register("cat.png");

        match classify(Ok(image(false, "dog.png")), &suppressor) {
            Classification::InboundImage(event) => {
                assert_eq!(event.sender.raw.as_deref(), Some("8:live:alice"));
            }
            other => panic!("unexpected classification {:?}", other),
        }
        assert_eq!(suppressor.pending_count("cat.png"), 1);
    }

    #[test]
    fn test_self_image_from_other_client_is_scrubbed() {
        match classify(Ok(image(true, "dog.png")), &EchoSuppressor::new()) {
            Classification::InboundImage(event) => assert!(event.sender.raw.is_none()),
            other => panic!("unexpected classification {:?}", other),
        }
    }

    #[test]
    fn test_other_resources_ignored() {
        let event = RawEvent::Other {
            resource_type: "Control/Typing".to_string(),
        };
        assert_eq!(classify(Ok(event), &EchoSuppressor::new()), Classification::Ignored);
    }

    #[test]
    fn test_malformed_event_ignored() {
        let result = classify(
            Err(EventDecodeError::MissingField { field: "from" }),
            &EchoSuppressor::new(),
        );
        assert_eq!(result, Classification::Ignored);
    }
}

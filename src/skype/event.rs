//! Decoding of long-poll notifications into [`RawEvent`]s.

use fancy_regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::bridge::markup::decode_named_entities;
use crate::common::error::EventDecodeError;
use crate::common::types::{ImageEvent, RawEvent, Sender, TextEvent};
use crate::common::SessionEvent;

const NEW_MESSAGE: &str = "NewMessage";

/// Body of a poll response. An empty body carries no events.
///
/// Notifications stay untyped here so that one bad envelope is reported on
/// its own instead of failing the whole batch.
#[derive(Debug, Default, Deserialize)]
pub struct PollResponse {
    #[serde(rename = "eventMessages", default)]
    pub event_messages: Vec<Value>,
}

/// Turns notification resources into typed events.
pub struct EventDecoder {
    /// Username of the authenticated account, without the `8:` prefix.
    self_username: String,
    uri_re: Regex,
    original_name_re: Regex,
    meta_name_re: Regex,
}

impl EventDecoder {
    pub fn new(self_username: impl Into<String>) -> Self {
        Self {
            self_username: self_username.into(),
            uri_re: Regex::new(r#"<URIObject[^>]*\suri="([^"]+)""#).unwrap(),
            original_name_re: Regex::new(r#"<OriginalName\s+v="([^"]*)""#).unwrap(),
            meta_name_re: Regex::new(r#"originalName="([^"]*)""#).unwrap(),
        }
    }

    /// Decode every notification in a poll response, in order.
    pub fn decode_poll(&self, response: PollResponse) -> Vec<SessionEvent> {
        response
            .event_messages
            .into_iter()
            .map(|message| SessionEvent::Event(self.decode_message(message)))
            .collect()
    }

    fn decode_message(&self, message: Value) -> Result<RawEvent, EventDecodeError> {
        let resource_type = str_field(&message, "resourceType")?;
        if resource_type != NEW_MESSAGE {
            return Ok(RawEvent::Other {
                resource_type: resource_type.to_string(),
            });
        }
        self.decode_resource(message.get("resource").unwrap_or(&Value::Null))
    }

    /// Decode a `NewMessage` resource.
    pub fn decode_resource(&self, resource: &Value) -> Result<RawEvent, EventDecodeError> {
        let message_type = str_field(resource, "messagetype")?;

        match message_type {
            "Text" | "RichText" => Ok(RawEvent::Text(TextEvent {
                sender: self.sender(resource)?,
                conversation: conversation(resource)?,
                content: str_field(resource, "content")?.to_string(),
            })),
            "RichText/UriObject" => {
                let content = str_field(resource, "content")?;
                Ok(RawEvent::Image(ImageEvent {
                    sender: self.sender(resource)?,
                    conversation: conversation(resource)?,
                    uri: self.image_uri(content)?,
                    original_file_name: self.image_name(content),
                }))
            }
            other => Ok(RawEvent::Other {
                resource_type: other.to_string(),
            }),
        }
    }

    fn sender(&self, resource: &Value) -> Result<Sender, EventDecodeError> {
        let from = str_field(resource, "from")?;
        let raw = link_tail(from, "/contacts/").ok_or_else(|| EventDecodeError::InvalidField {
            field: "from",
            message: format!("no contact in '{}'", from),
        })?;

        let username = raw.split_once(':').map(|(_, name)| name).unwrap_or(raw);
        Ok(Sender {
            is_self: username == self.self_username,
            raw: Some(raw.to_string()),
        })
    }

    fn image_uri(&self, content: &str) -> Result<String, EventDecodeError> {
        capture(&self.uri_re, content).ok_or(EventDecodeError::MissingField { field: "uri" })
    }

    fn image_name(&self, content: &str) -> String {
        capture(&self.original_name_re, content)
            .or_else(|| capture(&self.meta_name_re, content))
            .map(|name| decode_named_entities(&name))
            .unwrap_or_default()
    }
}

fn str_field<'a>(resource: &'a Value, field: &'static str) -> Result<&'a str, EventDecodeError> {
    match resource.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(EventDecodeError::InvalidField {
            field,
            message: format!("expected string, got {}", other),
        }),
        None => Err(EventDecodeError::MissingField { field }),
    }
}

fn conversation(resource: &Value) -> Result<String, EventDecodeError> {
    let link = str_field(resource, "conversationLink")?;
    link_tail(link, "/conversations/")
        .map(str::to_string)
        .ok_or_else(|| EventDecodeError::InvalidField {
            field: "conversationLink",
            message: format!("no conversation in '{}'", link),
        })
}

/// Part of `link` after the last occurrence of `marker`.
fn link_tail<'a>(link: &'a str, marker: &str) -> Option<&'a str> {
    link.rsplit_once(marker)
        .map(|(_, tail)| tail)
        .filter(|tail| !tail.is_empty())
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .ok()
        .flatten()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

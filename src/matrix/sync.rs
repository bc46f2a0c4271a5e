//! Puppet `/sync` loop: messages the Matrix user writes into bridged rooms
//! become commands for the Skype side.

use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::common::error::{BridgeError, BridgeResult};
use crate::common::types::OutboundImage;
use crate::common::BridgeCommand;
use crate::config::Config;
use crate::matrix::homeserver::{HomeserverBridge, RELAYED_KEY};

/// Only room messages are of interest.
const SYNC_FILTER: &str = r#"{"room":{"timeline":{"types":["m.room.message"],"limit":50},"state":{"types":[]},"ephemeral":{"types":[]},"account_data":{"types":[]}},"presence":{"types":[]},"account_data":{"types":[]}}"#;

/// Content of a message the puppet wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PuppetContent {
    Text(String),
    Image { mxc_url: String, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuppetMessage {
    pub room_id: String,
    pub content: PuppetContent,
}

/// One `/sync` response, reduced to what the bridge needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncBatch {
    pub next_batch: String,
    pub messages: Vec<PuppetMessage>,
}

/// Long-polls `/sync` as the puppet and emits [`BridgeCommand`]s.
pub struct PuppetSync {
    http: reqwest::Client,
    homeserver: String,
    puppet_user_id: String,
    access_token: String,
    timeout_ms: u64,
    bridge: Arc<HomeserverBridge>,
    commands: mpsc::UnboundedSender<BridgeCommand>,
}

impl PuppetSync {
    pub fn new(
        config: &Config,
        bridge: Arc<HomeserverBridge>,
        commands: mpsc::UnboundedSender<BridgeCommand>,
    ) -> BridgeResult<Self> {
        let timeout_ms = config.sync_timeout_ms();
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_millis(timeout_ms) + Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            homeserver: bridge.homeserver().to_string(),
            puppet_user_id: config.matrix.puppet.user_id.clone(),
            access_token: config.matrix.puppet.access_token.clone(),
            timeout_ms,
            bridge,
            commands,
        })
    }

    /// Run until shutdown. The first sync only establishes the starting point;
    /// history from before startup is never relayed.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> BridgeResult<()> {
        let mut since: Option<String> = None;
        let mut backoff = sync_backoff();

        loop {
            let result = tokio::select! {
                result = self.sync_once(since.as_deref()) => result,
                _ = shutdown.changed() => {
                    info!("Shutdown signal received, stopping Matrix sync");
                    return Ok(());
                }
            };

            match result {
                Ok(batch) => {
                    backoff = sync_backoff();
                    let bootstrap = since.is_none();
                    since = Some(batch.next_batch);
                    if bootstrap {
                        info!("Matrix sync started");
                        continue;
                    }

                    for message in batch.messages {
                        if !self.dispatch(message).await {
                            info!("Command receiver closed, stopping Matrix sync");
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    let delay = backoff.next().unwrap_or(Duration::from_secs(60));
                    warn!(
                        "Matrix sync failed: {}. Retrying in {:.1} seconds...",
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => return Ok(()),
                    }
                }
            }
        }
    }

    async fn sync_once(&self, since: Option<&str>) -> BridgeResult<SyncBatch> {
        let timeout_ms = if since.is_some() { self.timeout_ms } else { 0 };
        let mut request = self
            .http
            .get(format!("{}/_matrix/client/v3/sync", self.homeserver))
            .bearer_auth(&self.access_token)
            .query(&[("timeout", timeout_ms.to_string().as_str()), ("filter", SYNC_FILTER)]);
        if let Some(since) = since {
            request = request.query(&[("since", since)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Matrix {
                endpoint: "sync",
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let payload: Value = response.json().await?;
        parse_sync(&payload, &self.puppet_user_id)
    }

    /// Turn a puppet message into a command. Returns false once nobody listens.
    async fn dispatch(&self, message: PuppetMessage) -> bool {
        let room_token = match self.bridge.room_token(&message.room_id).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(room_id = %message.room_id, "Not a bridged room");
                return true;
            }
            Err(e) => {
                warn!(room_id = %message.room_id, "Failed to look up room token: {}", e);
                return true;
            }
        };

        let Some(command) = to_command(message.content, room_token, &self.homeserver) else {
            warn!(room_id = %message.room_id, "Dropping image without a usable URL");
            return true;
        };
        self.commands.send(command).is_ok()
    }
}

fn sync_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(60))
        .with_factor(2.0)
        .with_jitter()
        .without_max_times()
        .build()
}

/// Extract the puppet's own, not yet relayed, messages from a `/sync` body.
pub fn parse_sync(payload: &Value, puppet_user_id: &str) -> BridgeResult<SyncBatch> {
    let next_batch = payload
        .get("next_batch")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BridgeError::Matrix {
            endpoint: "sync",
            message: "response missing next_batch".to_string(),
        })?;

    let mut messages = Vec::new();
    if let Some(rooms) = payload.pointer("/rooms/join").and_then(Value::as_object) {
        for (room_id, room) in rooms {
            let Some(events) = room.pointer("/timeline/events").and_then(Value::as_array) else {
                continue;
            };

            for event in events {
                if event.get("sender").and_then(Value::as_str) != Some(puppet_user_id) {
                    continue;
                }
                if let Some(content) = puppet_content(event) {
                    messages.push(PuppetMessage {
                        room_id: room_id.clone(),
                        content,
                    });
                }
            }
        }
    }

    Ok(SyncBatch {
        next_batch,
        messages,
    })
}

fn puppet_content(event: &Value) -> Option<PuppetContent> {
    if event.get("type").and_then(Value::as_str) != Some("m.room.message") {
        return None;
    }
    let content = event.get("content")?;
    if content.get(RELAYED_KEY).is_some() {
        return None;
    }
    // Edits would arrive on Skype as duplicates
    if content.pointer("/m.relates_to/rel_type").and_then(Value::as_str) == Some("m.replace") {
        return None;
    }

    let body = content.get("body").and_then(Value::as_str)?.to_string();
    match content.get("msgtype").and_then(Value::as_str)? {
        "m.text" | "m.notice" | "m.emote" => Some(PuppetContent::Text(body)),
        "m.image" => Some(PuppetContent::Image {
            mxc_url: content.get("url").and_then(Value::as_str)?.to_string(),
            body,
        }),
        _ => None,
    }
}

/// Command for a puppet message; `None` for images with an unusable URL.
pub fn to_command(content: PuppetContent, room_token: String, homeserver: &str) -> Option<BridgeCommand> {
    match content {
        PuppetContent::Text(text) => Some(BridgeCommand::SendText { room_token, text }),
        PuppetContent::Image { mxc_url, body } => Some(BridgeCommand::SendImage {
            room_token,
            image: OutboundImage {
                url: mxc_to_http(homeserver, &mxc_url)?,
                text: body,
            },
        }),
    }
}

/// Download URL of an `mxc://server/media-id` URI.
pub fn mxc_to_http(homeserver: &str, mxc: &str) -> Option<String> {
    let (server, media_id) = mxc.strip_prefix("mxc://")?.split_once('/')?;
    if server.is_empty() || media_id.is_empty() || media_id.contains('/') {
        return None;
    }
    Some(format!(
        "{}/_matrix/media/v3/download/{}/{}",
        homeserver.trim_end_matches('/'),
        server,
        media_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PUPPET: &str = "@me:example.org";

    fn sync_body(events: Value) -> Value {
        json!({
            "next_batch": "s72595_4483_1934",
            "rooms": { "join": { "!room:example.org": { "timeline": { "events": events } } } }
        })
    }

    #[test]
    fn test_parse_puppet_messages() {
        let body = sync_body(json!([
            { "type": "m.room.message", "sender": PUPPET,
              "content": { "msgtype": "m.text", "body": "hello" } },
            { "type": "m.room.message", "sender": "@skype_abc:example.org",
              "content": { "msgtype": "m.text", "body": "from a ghost" } },
            { "type": "m.room.message", "sender": PUPPET,
              "content": { "msgtype": "m.image", "body": "cat.png", "url": "mxc://example.org/abc" } },
            { "type": "m.room.member", "sender": PUPPET, "content": { "membership": "join" } },
        ]));

        let batch = parse_sync(&body, PUPPET).unwrap();

        assert_eq!(batch.next_batch, "s72595_4483_1934");
        assert_eq!(
            batch.messages,
            vec![
                PuppetMessage {
                    room_id: "!room:example.org".to_string(),
                    content: PuppetContent::Text("hello".to_string()),
                },
                PuppetMessage {
                    room_id: "!room:example.org".to_string(),
                    content: PuppetContent::Image {
                        mxc_url: "mxc://example.org/abc".to_string(),
                        body: "cat.png".to_string(),
                    },
                },
            ]
        );
    }

    #[test]
    fn test_relayed_and_edited_messages_skipped() {
        let body = sync_body(json!([
            { "type": "m.room.message", "sender": PUPPET,
              "content": { "msgtype": "m.text", "body": "echo", "org.skype_puppet.relayed": true } },
            { "type": "m.room.message", "sender": PUPPET,
              "content": { "msgtype": "m.text", "body": "* fixed",
                           "m.relates_to": { "rel_type": "m.replace", "event_id": "$x" } } },
            { "type": "m.room.message", "sender": PUPPET,
              "content": { "msgtype": "m.file", "body": "doc.pdf", "url": "mxc://example.org/f" } },
        ]));

        assert!(parse_sync(&body, PUPPET).unwrap().messages.is_empty());
    }

    #[test]
    fn test_missing_next_batch() {
        assert!(matches!(
            parse_sync(&json!({ "rooms": {} }), PUPPET),
            Err(BridgeError::Matrix { endpoint: "sync", .. })
        ));
    }

    #[test]
    fn test_empty_sync() {
        let batch = parse_sync(&json!({ "next_batch": "s1" }), PUPPET).unwrap();
        assert!(batch.messages.is_empty());
    }

    #[test]
    fn test_mxc_to_http() {
        assert_eq!(
            mxc_to_http("https://matrix.example.org/", "mxc://example.org/AbCd").as_deref(),
            Some("https://matrix.example.org/_matrix/media/v3/download/example.org/AbCd")
        );
        assert_eq!(mxc_to_http("https://m", "https://example.org/x"), None);
        assert_eq!(mxc_to_http("https://m", "mxc://example.org"), None);
        assert_eq!(mxc_to_http("https://m", "mxc://example.org/a/b"), None);
    }

    #[test]
    fn test_commands() {
        assert_eq!(
            to_command(PuppetContent::Text("hi".to_string()), "dG9r".to_string(), "https://m"),
            Some(BridgeCommand::SendText {
                room_token: "dG9r".to_string(),
                text: "hi".to_string(),
            })
        );

        let image = PuppetContent::Image {
            mxc_url: "mxc://s/id".to_string(),
            body: "cat.png".to_string(),
        };
        assert_eq!(
            to_command(image, "dG9r".to_string(), "https://m"),
            Some(BridgeCommand::SendImage {
                room_token: "dG9r".to_string(),
                image: OutboundImage {
                    url: "https://m/_matrix/media/v3/download/s/id".to_string(),
                    text: "cat.png".to_string(),
                },
            })
        );

        let broken = PuppetContent::Image {
            mxc_url: "not-mxc".to_string(),
            body: "x".to_string(),
        };
        assert_eq!(to_command(broken, "dG9r".to_string(), "https://m"), None);
    }

    #[test]
    fn test_filter_is_valid_json() {
        let filter: Value = serde_json::from_str(SYNC_FILTER).unwrap();
        assert_eq!(filter.pointer("/room/timeline/types/0"), Some(&json!("m.room.message")));
    }
}

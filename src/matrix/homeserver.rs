//! Bridge framework backed by a Matrix homeserver.
//!
//! Skype conversations become rooms aliased `#<prefix><key>:<server>`,
//! Skype users become application-service ghosts. Messages from the puppet
//! itself are posted with the puppet's own token and tagged so the sync loop
//! does not send them back.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::common::error::{BridgeError, BridgeResult};
use crate::common::RoomMessagePayload;
use crate::config::MatrixConfig;
use crate::matrix::{BridgeFramework, ThirdPartyClient};

/// State event holding the room token of a bridged room.
pub const ROOM_TOKEN_EVENT: &str = "org.skype_puppet.room";
/// Content key set on messages the bridge posts as the puppet.
pub const RELAYED_KEY: &str = "org.skype_puppet.relayed";

const CLIENT_API: &str = "/_matrix/client/v3";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Profile {
    name: String,
    avatar_url: Option<String>,
}

#[derive(Debug, Default)]
struct RoomCache {
    /// Display key -> room id.
    rooms: HashMap<String, String>,
    /// Room id -> room token.
    tokens: HashMap<String, String>,
    /// Ghost user id -> last profile set.
    profiles: HashMap<String, Profile>,
    /// `(room id, user id)` memberships already established.
    joined: HashSet<(String, String)>,
    /// Room id behind a status room configured by alias.
    status_room: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Auth<'a> {
    /// The application service bot.
    Bot,
    /// A ghost, via application-service masquerading.
    Ghost(&'a str),
    /// The puppeted user's own token.
    Puppet,
}

/// [`BridgeFramework`] posting into a homeserver.
pub struct HomeserverBridge {
    http: reqwest::Client,
    homeserver: String,
    server_name: String,
    puppet_user_id: String,
    puppet_token: String,
    as_token: String,
    prefix: String,
    status_room: Option<String>,
    client: Arc<dyn ThirdPartyClient>,
    cache: Mutex<RoomCache>,
}

impl HomeserverBridge {
    pub fn new(config: &MatrixConfig, client: Arc<dyn ThirdPartyClient>) -> BridgeResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            homeserver: config.homeserver_url.trim_end_matches('/').to_string(),
            server_name: config.server_name.clone(),
            puppet_user_id: config.puppet.user_id.clone(),
            puppet_token: config.puppet.access_token.clone(),
            as_token: config.appservice.token.clone(),
            prefix: config.appservice.prefix.clone(),
            status_room: config.status_room.clone(),
            client,
            cache: Mutex::new(RoomCache::default()),
        })
    }

    pub fn homeserver(&self) -> &str {
        &self.homeserver
    }

    /// Room token of a bridged room, or `None` for rooms the bridge does not own.
    pub async fn room_token(&self, room_id: &str) -> BridgeResult<Option<String>> {
        let cached = self.lock().tokens.get(room_id).cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let path = format!(
            "{}/rooms/{}/state/{}/",
            CLIENT_API,
            urlencoding::encode(room_id),
            ROOM_TOKEN_EVENT
        );
        let (status, body) = self
            .call(Method::GET, &path, Auth::Puppet, None, "room state")
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(matrix_error("room state", status, &body));
        }

        let token = body.get("token").and_then(Value::as_str).map(str::to_string);
        if let Some(token) = &token {
            self.lock().tokens.insert(room_id.to_string(), token.clone());
        }
        Ok(token)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RoomCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        auth: Auth<'_>,
        body: Option<&Value>,
        endpoint: &'static str,
    ) -> BridgeResult<(StatusCode, Value)> {
        let mut request = self.http.request(method, format!("{}{}", self.homeserver, path));
        request = match auth {
            Auth::Bot => request.bearer_auth(&self.as_token),
            Auth::Ghost(user_id) => request
                .bearer_auth(&self.as_token)
                .query(&[("user_id", user_id)]),
            Auth::Puppet => request.bearer_auth(&self.puppet_token),
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(endpoint, status = status.as_u16(), "Matrix request");

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::Null)
        };
        Ok((status, value))
    }

    async fn call_ok(
        &self,
        method: Method,
        path: &str,
        auth: Auth<'_>,
        body: Option<&Value>,
        endpoint: &'static str,
    ) -> BridgeResult<Value> {
        let (status, value) = self.call(method, path, auth, body, endpoint).await?;
        if status.is_success() {
            Ok(value)
        } else {
            Err(matrix_error(endpoint, status, &value))
        }
    }

    /// Room for a payload, creating it on first use.
    async fn resolve_room(&self, payload: &RoomMessagePayload) -> BridgeResult<String> {
        let cached = self.lock().rooms.get(&payload.room_id).cloned();
        if let Some(room_id) = cached {
            return Ok(room_id);
        }

        let alias_localpart = prefixed_localpart(&self.prefix, &payload.room_id);
        let alias = format!("#{}:{}", alias_localpart, self.server_name);
        let room_id = match self.lookup_alias(&alias, Auth::Bot).await? {
            Some(room_id) => room_id,
            None => self.create_room(&alias_localpart, &payload.room_token).await?,
        };

        self.ensure_puppet_joined(&room_id).await?;

        let mut cache = self.lock();
        cache.rooms.insert(payload.room_id.clone(), room_id.clone());
        cache.tokens.insert(room_id.clone(), payload.room_token.clone());
        Ok(room_id)
    }

    /// Room id behind `alias`, or `None` if the alias does not exist.
    async fn lookup_alias(&self, alias: &str, auth: Auth<'_>) -> BridgeResult<Option<String>> {
        let path = format!("{}/directory/room/{}", CLIENT_API, urlencoding::encode(alias));
        let (status, body) = self
            .call(Method::GET, &path, auth, None, "directory")
            .await?;
        directory_room_id(status, &body)
    }

    /// Room receiving status messages. An alias is looked up once.
    async fn status_room_id(&self) -> BridgeResult<Option<String>> {
        let Some(configured) = &self.status_room else {
            return Ok(None);
        };
        if !configured.starts_with('#') {
            return Ok(Some(configured.clone()));
        }

        let cached = self.lock().status_room.clone();
        if cached.is_some() {
            return Ok(cached);
        }

        let room_id = self
            .lookup_alias(configured, Auth::Puppet)
            .await?
            .ok_or_else(|| BridgeError::Matrix {
                endpoint: "directory",
                message: format!("status room {} does not exist", configured),
            })?;
        debug!(alias = %configured, room_id = %room_id, "Resolved status room");
        self.lock().status_room = Some(room_id.clone());
        Ok(Some(room_id))
    }

    async fn create_room(&self, alias_localpart: &str, room_token: &str) -> BridgeResult<String> {
        let mut request = json!({
            "room_alias_name": alias_localpart,
            "visibility": "private",
            "preset": "private_chat",
            "invite": [self.puppet_user_id],
            "initial_state": [{
                "type": ROOM_TOKEN_EVENT,
                "state_key": "",
                "content": { "token": room_token },
            }],
        });

        match self.client.get_third_party_room_data_by_id(room_token).await {
            Ok(data) => {
                request["name"] = json!(data.name);
                request["topic"] = json!(data.topic);
            }
            Err(e) => warn!("No room data for new room, creating it unnamed: {}", e),
        }

        let body = self
            .call_ok(
                Method::POST,
                &format!("{}/createRoom", CLIENT_API),
                Auth::Bot,
                Some(&request),
                "createRoom",
            )
            .await?;
        let room_id = body
            .get("room_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BridgeError::Matrix {
                endpoint: "createRoom",
                message: "response without room_id".to_string(),
            })?;

        info!(room_id = %room_id, alias = alias_localpart, "Created bridged room");
        Ok(room_id)
    }

    async fn ensure_puppet_joined(&self, room_id: &str) -> BridgeResult<()> {
        let key = (room_id.to_string(), self.puppet_user_id.clone());
        if self.lock().joined.contains(&key) {
            return Ok(());
        }

        let path = format!("{}/join/{}", CLIENT_API, urlencoding::encode(room_id));
        self.call_ok(Method::POST, &path, Auth::Puppet, Some(&json!({})), "join")
            .await?;
        self.lock().joined.insert(key);
        Ok(())
    }

    /// Register a ghost for `sender_token` and keep its profile current.
    async fn ensure_ghost(&self, sender_token: &str, profile: Profile) -> BridgeResult<String> {
        let localpart = prefixed_localpart(&self.prefix, sender_token);
        let user_id = format!("@{}:{}", localpart, self.server_name);

        let known = self.lock().profiles.get(&user_id).cloned();
        if known.as_ref() == Some(&profile) {
            return Ok(user_id);
        }

        if known.is_none() {
            let (status, body) = self
                .call(
                    Method::POST,
                    &format!("{}/register", CLIENT_API),
                    Auth::Bot,
                    Some(&json!({
                        "type": "m.login.application_service",
                        "username": localpart,
                    })),
                    "register",
                )
                .await?;
            let in_use = body.get("errcode").and_then(Value::as_str) == Some("M_USER_IN_USE");
            if !status.is_success() && !in_use {
                return Err(matrix_error("register", status, &body));
            }
        }

        let path = format!(
            "{}/profile/{}/displayname",
            CLIENT_API,
            urlencoding::encode(&user_id)
        );
        self.call_ok(
            Method::PUT,
            &path,
            Auth::Ghost(&user_id),
            Some(&json!({ "displayname": profile.name })),
            "displayname",
        )
        .await?;

        if let Some(avatar_url) = &profile.avatar_url {
            if let Err(e) = self.set_avatar(&user_id, avatar_url).await {
                warn!(user_id = %user_id, "Failed to set avatar: {}", e);
            }
        }

        self.lock().profiles.insert(user_id.clone(), profile);
        Ok(user_id)
    }

    async fn set_avatar(&self, user_id: &str, avatar_url: &str) -> BridgeResult<()> {
        let response = self.http.get(avatar_url).send().await?;
        if !response.status().is_success() {
            return Err(BridgeError::Matrix {
                endpoint: "avatar",
                message: format!("avatar download returned HTTP {}", response.status().as_u16()),
            });
        }
        let mimetype = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let buffer = response.bytes().await?;

        let content_uri = self.upload(buffer, &mimetype, "avatar").await?;
        let path = format!("{}/profile/{}/avatar_url", CLIENT_API, urlencoding::encode(user_id));
        self.call_ok(
            Method::PUT,
            &path,
            Auth::Ghost(user_id),
            Some(&json!({ "avatar_url": content_uri })),
            "avatar_url",
        )
        .await?;
        Ok(())
    }

    async fn ensure_member(&self, room_id: &str, user_id: &str) -> BridgeResult<()> {
        let key = (room_id.to_string(), user_id.to_string());
        if self.lock().joined.contains(&key) {
            return Ok(());
        }

        let room = urlencoding::encode(room_id);
        let (status, body) = self
            .call(
                Method::POST,
                &format!("{}/rooms/{}/invite", CLIENT_API, room),
                Auth::Bot,
                Some(&json!({ "user_id": user_id })),
                "invite",
            )
            .await?;
        if !status.is_success() {
            // Already a member, or invited earlier
            debug!(user_id, "Invite not accepted: {}", matrix_error("invite", status, &body));
        }

        self.call_ok(
            Method::POST,
            &format!("{}/join/{}", CLIENT_API, room),
            Auth::Ghost(user_id),
            Some(&json!({})),
            "join",
        )
        .await?;
        self.lock().joined.insert(key);
        Ok(())
    }

    async fn upload(&self, buffer: Bytes, mimetype: &str, filename: &str) -> BridgeResult<String> {
        let response = self
            .http
            .post(format!("{}/_matrix/media/v3/upload", self.homeserver))
            .bearer_auth(&self.as_token)
            .query(&[("filename", filename)])
            .header(CONTENT_TYPE, mimetype)
            .body(buffer)
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(matrix_error("upload", status, &body));
        }

        body.get("content_uri")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BridgeError::Matrix {
                endpoint: "upload",
                message: "response without content_uri".to_string(),
            })
    }

    /// Post `content` into the payload's room as its sender.
    async fn deliver(&self, payload: &RoomMessagePayload, mut content: Value) -> BridgeResult<()> {
        let room_id = self.resolve_room(payload).await?;

        match &payload.sender_id {
            Some(sender_id) => {
                let profile = Profile {
                    name: payload
                        .sender_name
                        .clone()
                        .unwrap_or_else(|| sender_id.clone()),
                    avatar_url: payload.avatar_url.clone(),
                };
                let ghost = self.ensure_ghost(sender_id, profile).await?;
                self.ensure_member(&room_id, &ghost).await?;
                self.send_event(&room_id, Auth::Ghost(&ghost), &content).await
            }
            None => {
                content[RELAYED_KEY] = json!(true);
                self.send_event(&room_id, Auth::Puppet, &content).await
            }
        }
    }

    async fn send_event(&self, room_id: &str, auth: Auth<'_>, content: &Value) -> BridgeResult<()> {
        let path = format!(
            "{}/rooms/{}/send/m.room.message/{}",
            CLIENT_API,
            urlencoding::encode(room_id),
            transaction_id()
        );
        self.call_ok(Method::PUT, &path, auth, Some(content), "send")
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BridgeFramework for HomeserverBridge {
    async fn handle_third_party_room_message(&self, payload: RoomMessagePayload) -> BridgeResult<()> {
        let content = json!({ "msgtype": "m.text", "body": payload.text });
        self.deliver(&payload, content).await
    }

    async fn handle_third_party_room_image_message(
        &self,
        payload: RoomMessagePayload,
    ) -> BridgeResult<()> {
        let buffer = payload.buffer.clone().unwrap_or_default();
        let mimetype = payload
            .mimetype
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let size = buffer.len();

        let content_uri = self.upload(buffer, &mimetype, &payload.text).await?;
        let content = json!({
            "msgtype": "m.image",
            "body": payload.text,
            "url": content_uri,
            "info": { "mimetype": mimetype, "size": size },
        });
        self.deliver(&payload, content).await
    }

    async fn send_status_message(&self, text: &str) -> BridgeResult<()> {
        let Some(room_id) = self.status_room_id().await? else {
            info!("Status: {}", text);
            return Ok(());
        };

        let mut content = json!({ "msgtype": "m.notice", "body": text });
        content[RELAYED_KEY] = json!(true);
        self.send_event(&room_id, Auth::Puppet, &content).await
    }
}

/// Room id from a `GET /directory/room/{alias}` reply; `None` on 404.
fn directory_room_id(status: StatusCode, body: &Value) -> BridgeResult<Option<String>> {
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(matrix_error("directory", status, body));
    }
    body.get("room_id")
        .and_then(Value::as_str)
        .map(|room_id| Some(room_id.to_string()))
        .ok_or_else(|| BridgeError::Matrix {
            endpoint: "directory",
            message: "response without room_id".to_string(),
        })
}

fn matrix_error(endpoint: &'static str, status: StatusCode, body: &Value) -> BridgeError {
    let errcode = body.get("errcode").and_then(Value::as_str).unwrap_or("");
    let error = body.get("error").and_then(Value::as_str).unwrap_or("");
    BridgeError::Matrix {
        endpoint,
        message: format!("HTTP {} {} {}", status.as_u16(), errcode, error)
            .trim_end()
            .to_string(),
    }
}

fn transaction_id() -> String {
    format!(
        "skype-{}-{}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

/// Escape an arbitrary string into the Matrix localpart alphabet.
///
/// Upper case letters become `_` plus the lower case letter, `_` doubles,
/// and anything outside `a-z0-9.-` becomes `=` plus the hex of each byte.
pub fn escape_localpart(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 2);
    for c in raw.chars() {
        match c {
            'A'..='Z' => {
                out.push('_');
                out.push(c.to_ascii_lowercase());
            }
            '_' => out.push_str("__"),
            'a'..='z' | '0'..='9' | '.' | '-' => out.push(c),
            _ => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    out.push_str(&format!("={:02x}", byte));
                }
            }
        }
    }
    out
}

/// Localpart for a ghost (from a sender token) or a room alias (from a
/// display key).
pub fn prefixed_localpart(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, escape_localpart(key))
}

//! HTTP client for the Skype messaging service.
//!
//! Connection sequence:
//! 1. Obtain a skype token (login or config)
//! 2. Register a messaging endpoint
//! 3. Subscribe the endpoint to conversation resources
//! 4. Set presence to Online
//!
//! Events are then read by long-polling the subscription.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::markup::escape_html;
use crate::bridge::transfer::DownloadAuth;
use crate::common::error::{SkypeError, SkypeResult};
use crate::common::types::{ContactRecord, ConversationKind, ConversationRef};
use crate::common::SessionEvent;
use crate::config::SkypeConfig;
use crate::skype::auth;
use crate::skype::event::{EventDecoder, PollResponse};
use crate::skype::{ImageUpload, SkypeApi};

const MESSENGER_HOST: &str = "https://client-s.gateway.messenger.live.com";
const CONTACTS_HOST: &str = "https://contacts.skype.com";
const OBJECTS_HOST: &str = "https://api.asm.skype.com";

/// Upper bound for one long-poll request.
const POLL_TIMEOUT: Duration = Duration::from_secs(60);
/// Pause after a failed poll before trying again.
const POLL_ERROR_DELAY: Duration = Duration::from_secs(5);

const SUBSCRIBED_RESOURCES: [&str; 4] = [
    "/v1/users/ME/conversations/ALL/properties",
    "/v1/users/ME/conversations/ALL/messages",
    "/v1/users/ME/contacts/ALL",
    "/v1/threads/ALL",
];

#[derive(Debug, Deserialize)]
struct ContactsResponse {
    #[serde(default)]
    contacts: Vec<ContactEntry>,
}

#[derive(Debug, Deserialize)]
struct ContactEntry {
    person_id: String,
    mri: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    profile: Option<ContactProfile>,
}

#[derive(Debug, Deserialize)]
struct ContactProfile {
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationResponse {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "threadProperties", default)]
    thread_properties: Option<ThreadProperties>,
}

#[derive(Debug, Deserialize)]
struct ThreadProperties {
    topic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectResponse {
    id: String,
}

struct ClientInner {
    http: reqwest::Client,
    cookies: Arc<Jar>,
    username: String,
    skype_token: String,
    /// `registrationToken=...` header value.
    registration_token: String,
    /// Messenger origin assigned to the endpoint.
    host: String,
    decoder: EventDecoder,
}

/// An authenticated Skype session.
#[derive(Clone)]
pub struct SkypeClient {
    inner: Arc<ClientInner>,
}

impl SkypeClient {
    /// Authenticate and register a messaging endpoint.
    pub async fn connect(config: &SkypeConfig) -> SkypeResult<Self> {
        let cookies = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let skype_token = match config.token() {
            Some(token) => {
                info!("Using configured skype token");
                token.to_string()
            }
            None => auth::login(&http, &config.username, &config.password).await?,
        };

        let (registration_token, host) = register_endpoint(&http, &skype_token).await?;
        info!(host = %host, "Registered messaging endpoint");

        let client = Self {
            inner: Arc::new(ClientInner {
                http,
                cookies,
                username: config.username.clone(),
                skype_token,
                registration_token,
                host,
                decoder: EventDecoder::new(config.username.clone()),
            }),
        };

        client.subscribe().await?;
        if let Err(e) = client.set_presence_online().await {
            warn!("Failed to set presence: {}", e);
        }

        Ok(client)
    }

    fn messenger_url(&self, path: &str) -> String {
        format!("{}/v1/users/ME{}", self.inner.host, path)
    }

    fn registration_header(&self) -> (&'static str, &str) {
        ("RegistrationToken", self.inner.registration_token.as_str())
    }

    fn object_auth(&self) -> String {
        format!("skype_token {}", self.inner.skype_token)
    }

    async fn subscribe(&self) -> SkypeResult<()> {
        let (name, value) = self.registration_header();
        let response = self
            .inner
            .http
            .post(self.messenger_url("/endpoints/SELF/subscriptions"))
            .header(name, value)
            .json(&json!({
                "interestedResources": SUBSCRIBED_RESOURCES,
                "template": "raw",
                "channelType": "httpLongPoll",
            }))
            .send()
            .await?;
        check_status(response, "subscriptions")?;
        debug!("Subscribed to conversation resources");
        Ok(())
    }

    async fn set_presence_online(&self) -> SkypeResult<()> {
        let (name, value) = self.registration_header();
        let response = self
            .inner
            .http
            .put(self.messenger_url("/presenceDocs/messagingService"))
            .header(name, value)
            .json(&json!({ "status": "Online" }))
            .send()
            .await?;
        check_status(response, "presence")?;
        Ok(())
    }

    /// One long-poll round trip.
    async fn poll(&self) -> SkypeResult<Vec<SessionEvent>> {
        let (name, value) = self.registration_header();
        let response = self
            .inner
            .http
            .post(self.messenger_url("/endpoints/SELF/subscriptions/0/poll"))
            .header(name, value)
            .timeout(POLL_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(SkypeError::SessionExpired)
            }
            _ => {}
        }
        let body = check_status(response, "poll")?.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let parsed: PollResponse =
            serde_json::from_str(&body).map_err(|e| SkypeError::InvalidResponse {
                endpoint: "poll",
                message: e.to_string(),
            })?;
        Ok(self.inner.decoder.decode_poll(parsed))
    }

    async fn poll_loop(self, events: mpsc::UnboundedSender<SessionEvent>) -> SkypeResult<()> {
        info!("Listening for Skype events");
        loop {
            if events.is_closed() {
                return Ok(());
            }

            match self.poll().await {
                Ok(batch) => {
                    for event in batch {
                        if events.send(event).is_err() {
                            return Ok(());
                        }
                    }
                }
                Err(SkypeError::SessionExpired) => return Err(SkypeError::SessionExpired),
                Err(e) => {
                    warn!("Skype poll failed: {}", e);
                    if events.send(SessionEvent::Error(e.to_string())).is_err() {
                        return Ok(());
                    }
                    tokio::time::sleep(POLL_ERROR_DELAY).await;
                }
            }
        }
    }

    async fn upload_object(&self, image: &ImageUpload, conversation_id: &str) -> SkypeResult<String> {
        let mut permissions = serde_json::Map::new();
        permissions.insert(conversation_id.to_string(), json!(["read"]));

        let response = self
            .inner
            .http
            .post(format!("{}/v1/objects", OBJECTS_HOST))
            .header("Authorization", self.object_auth())
            .json(&json!({
                "type": "pish/image",
                "permissions": permissions,
                "filename": image.name,
            }))
            .send()
            .await?;
        let object: ObjectResponse = check_status(response, "objects")?.json().await?;

        let bytes = tokio::fs::read(&image.file).await?;
        let response = self
            .inner
            .http
            .put(format!("{}/v1/objects/{}/content/imgpsh", OBJECTS_HOST, object.id))
            .header("Authorization", self.object_auth())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        check_status(response, "object content")?;

        debug!(object = %object.id, "Uploaded image object");
        Ok(object.id)
    }

    async fn post_message(&self, conversation_id: &str, content: &str, message_type: &str) -> SkypeResult<()> {
        let (name, value) = self.registration_header();
        let response = self
            .inner
            .http
            .post(self.messenger_url(&format!(
                "/conversations/{}/messages",
                urlencoding::encode(conversation_id)
            )))
            .header(name, value)
            .json(&json!({
                "clientmessageid": chrono::Utc::now().timestamp_millis().to_string(),
                "content": content,
                "messagetype": message_type,
                "contenttype": "text",
            }))
            .send()
            .await?;
        check_status(response, "messages")?;
        Ok(())
    }
}

#[async_trait]
impl SkypeApi for SkypeClient {
    fn listen(&self, events: mpsc::UnboundedSender<SessionEvent>) -> JoinHandle<SkypeResult<()>> {
        tokio::spawn(self.clone().poll_loop(events))
    }

    async fn get_contacts(&self) -> SkypeResult<Vec<ContactRecord>> {
        let response = self
            .inner
            .http
            .get(format!(
                "{}/contacts/v2/users/{}/contacts",
                CONTACTS_HOST,
                urlencoding::encode(&self.inner.username)
            ))
            .header("X-Skypetoken", self.inner.skype_token.as_str())
            .send()
            .await?;
        let parsed: ContactsResponse = check_status(response, "contacts")?.json().await?;

        Ok(parsed
            .contacts
            .into_iter()
            .map(|c| ContactRecord {
                person_id: c.person_id,
                mri: c.mri,
                display_name: c.display_name,
                avatar_url: c.profile.and_then(|p| p.avatar_url),
            })
            .collect())
    }

    async fn send_message(&self, content: &str, conversation_id: &str) -> SkypeResult<()> {
        self.post_message(conversation_id, content, "RichText").await
    }

    async fn send_image(&self, image: &ImageUpload, conversation_id: &str) -> SkypeResult<()> {
        let object_id = self.upload_object(image, conversation_id).await?;
        let content = image_object_content(&object_id, &image.name);
        self.post_message(conversation_id, &content, "RichText/UriObject")
            .await
    }

    async fn get_conversation(&self, id: &str) -> SkypeResult<ConversationRef> {
        let (name, value) = self.registration_header();
        let response = self
            .inner
            .http
            .get(self.messenger_url(&format!("/conversations/{}", urlencoding::encode(id))))
            .query(&[("view", "msnp24Equivalent")])
            .header(name, value)
            .send()
            .await?;
        let parsed: ConversationResponse = check_status(response, "conversation")?.json().await?;

        let kind = if parsed.kind.eq_ignore_ascii_case("conversation") {
            ConversationKind::Direct
        } else {
            ConversationKind::Group
        };
        Ok(ConversationRef {
            id: parsed.id,
            kind,
            topic: parsed
                .thread_properties
                .and_then(|t| t.topic)
                .unwrap_or_default(),
        })
    }

    fn download_auth(&self) -> DownloadAuth {
        DownloadAuth {
            headers: vec![("Authorization".to_string(), self.object_auth())],
            cookies: Some(self.inner.cookies.clone()),
        }
    }
}

/// Register a messaging endpoint; returns the registration header value and
/// the messenger origin to use from now on.
async fn register_endpoint(http: &reqwest::Client, skype_token: &str) -> SkypeResult<(String, String)> {
    let response = http
        .post(format!("{}/v1/users/ME/endpoints", MESSENGER_HOST))
        .header("Authentication", format!("skypetoken={}", skype_token))
        .json(&json!({ "endpointFeatures": "Agent" }))
        .send()
        .await?;
    let response = check_status(response, "endpoints")?;
    let headers = response.headers();

    let registration_token = header_str(headers, "Set-RegistrationToken")
        .and_then(parse_registration_token)
        .ok_or_else(|| SkypeError::InvalidResponse {
            endpoint: "endpoints",
            message: "missing registration token".to_string(),
        })?;
    let host = header_str(headers, LOCATION.as_str())
        .and_then(origin_of)
        .unwrap_or_else(|| MESSENGER_HOST.to_string());

    Ok((registration_token, host))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `registrationToken=...` part of a `Set-RegistrationToken` header.
fn parse_registration_token(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find(|part| part.starts_with("registrationToken="))
        .map(str::to_string)
}

fn origin_of(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    url.host_str()?;
    Some(url.origin().ascii_serialization())
}

fn check_status(response: Response, endpoint: &'static str) -> SkypeResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SkypeError::Status {
            endpoint,
            status: status.as_u16(),
        })
    }
}

/// Message content announcing an uploaded picture object.
fn image_object_content(object_id: &str, name: &str) -> String {
    let uri = format!("{}/v1/objects/{}", OBJECTS_HOST, object_id);
    let name = escape_html(name);
    format!(
        concat!(
            r#"<URIObject type="Picture.1" uri="{uri}" url_thumbnail="{uri}/views/imgt1">"#,
            r#"To view this shared photo, go to: <a href="{uri}/views/imgpsh_fullsize">{uri}/views/imgpsh_fullsize</a>"#,
            r#"<OriginalName v="{name}"/><meta type="photo" originalName="{name}"/></URIObject>"#
        ),
        uri = uri,
        name = name
    )
}

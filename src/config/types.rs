//! Configuration type definitions.

use serde::Deserialize;

/// Default avatar template for users missing from the contact list.
pub const DEFAULT_AVATAR_URL_TEMPLATE: &str =
    "https://avatars.skype.com/v1/avatars/%user/public?returnDefaultImage=false&cacheHeaders=true";

/// Default long-poll timeout for the puppet `/sync` loop.
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 30_000;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub skype: SkypeConfig,
    pub matrix: MatrixConfig,
    pub relay: Option<RelayConfig>,
}

/// Skype account credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct SkypeConfig {
    pub username: String,
    /// May be left out when `token` is set.
    #[serde(default)]
    pub password: String,
    /// Pre-issued skype token; skips the password login when set.
    pub token: Option<String>,
}

/// Homeserver and application service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MatrixConfig {
    pub homeserver_url: String,
    pub server_name: String,
    pub puppet: PuppetConfig,
    pub appservice: AppServiceConfig,
    /// Room id or alias that receives status messages (stream errors).
    pub status_room: Option<String>,
}

/// The Matrix user being puppeted.
#[derive(Debug, Clone, Deserialize)]
pub struct PuppetConfig {
    pub user_id: String,
    pub access_token: String,
}

/// Application service registration values.
#[derive(Debug, Clone, Deserialize)]
pub struct AppServiceConfig {
    pub token: String,
    #[serde(default = "default_localpart")]
    pub localpart: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

/// Relay tuning.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Avatar URL for unknown senders; `%user` is replaced by the user name.
    pub avatar_url_template: Option<String>,
    pub sync_timeout_ms: Option<u64>,
}

impl SkypeConfig {
    /// The configured skype token, if it is non-empty.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

fn default_localpart() -> String {
    "skypebot".to_string()
}

fn default_prefix() -> String {
    "skype_".to_string()
}

impl Config {
    /// Avatar template, falling back to the public Skype avatar service.
    pub fn avatar_url_template(&self) -> &str {
        self.relay
            .as_ref()
            .and_then(|r| r.avatar_url_template.as_deref())
            .unwrap_or(DEFAULT_AVATAR_URL_TEMPLATE)
    }

    pub fn sync_timeout_ms(&self) -> u64 {
        self.relay
            .as_ref()
            .and_then(|r| r.sync_timeout_ms)
            .unwrap_or(DEFAULT_SYNC_TIMEOUT_MS)
    }
}

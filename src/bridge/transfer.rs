//! Binary download of image attachments.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::Url;
use tracing::debug;

use crate::common::error::TransferError;
use crate::common::types::Media;

/// Content type assumed when the server does not send one.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Credentials attached to a download.
#[derive(Clone, Default)]
pub struct DownloadAuth {
    /// Extra request headers (e.g. `Authorization`).
    pub headers: Vec<(String, String)>,
    /// Cookie jar of the session the URL belongs to.
    pub cookies: Option<Arc<Jar>>,
}

impl DownloadAuth {
    /// No credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl fmt::Debug for DownloadAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("DownloadAuth")
            .field("headers", &header_names)
            .field("cookies", &self.cookies.is_some())
            .finish()
    }
}

/// Fetches a URL into memory.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url`. Any non-success response is an error.
    async fn fetch(&self, url: &str, auth: &DownloadAuth) -> Result<Media, TransferError>;
}

/// [`Fetcher`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, auth: &DownloadAuth) -> Result<Media, TransferError> {
        let parsed = Url::parse(url).map_err(|_| TransferError::InvalidUrl {
            url: url.to_string(),
        })?;

        let mut request = self.client.get(parsed.clone());
        for (name, value) in &auth.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = auth.cookies.as_ref().and_then(|jar| jar.cookies(&parsed)) {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();
        let buffer = response.bytes().await?;
        debug!(url, bytes = buffer.len(), content_type = %content_type, "Downloaded media");

        Ok(Media {
            buffer,
            content_type,
        })
    }
}

//! GCE (Google Compute Engine) metadata client
//!
//! Fetches metadata from the GCE metadata server.
//! <https://cloud.google.com/compute/docs/metadata/overview>

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::{METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE, MetadataWatcher};
use crate::ScriptError;
use crate::config::RetrieverSettings;
use crate::retry::RetryPolicy;

/// GCE metadata service base URL
pub const GCE_METADATA_URL: &str = "http://metadata.google.internal/computeMetadata/v1";

/// Metadata client for Google Cloud Platform
pub struct GceMetadata {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GceMetadata {
    /// Build a client from settings
    pub fn new(settings: &RetrieverSettings) -> Result<Self, ScriptError> {
        let client = Client::builder()
            .timeout(settings.metadata_timeout())
            .connect_timeout(settings.connect_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: settings.metadata_url.trim_end_matches('/').to_string(),
            retry: settings.retry_policy(),
        })
    }

    /// Create with a custom base URL (for testing)
    pub fn with_base_url(base_url: &str) -> Result<Self, ScriptError> {
        Self::new(&RetrieverSettings {
            metadata_url: base_url.to_string(),
            ..Default::default()
        })
    }

    /// Override the retry policy used when a caller asks for retries
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, key: Option<&str>) -> String {
        match key {
            Some(key) => format!("{}/{}", self.base_url, key.trim_start_matches('/')),
            None => format!("{}/", self.base_url),
        }
    }

    /// Fetch a metadata path once with the required Metadata-Flavor header
    async fn fetch_metadata(&self, url: &str, recursive: bool) -> Result<Option<Value>, ScriptError> {
        debug!("Fetching GCE metadata: {} (recursive: {})", url, recursive);

        let mut request = self
            .client
            .get(url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE);
        request = if recursive {
            request.query(&[("recursive", "true"), ("alt", "json")])
        } else {
            request.query(&[("alt", "json")])
        };

        let response = request.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Metadata key not found: {}", url);
            return Ok(None);
        }

        let body = response.error_for_status()?.text().await?;
        Ok(parse_body(&body))
    }
}

/// Interpret a metadata response body
///
/// JSON bodies are parsed; anything else is kept as a plain string. Empty
/// bodies and JSON `null` mean no value.
fn parse_body(body: &str) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(body.to_string())),
    }
}

#[async_trait]
impl MetadataWatcher for GceMetadata {
    async fn get_metadata(
        &self,
        key: Option<&str>,
        recursive: bool,
        retry: bool,
    ) -> Result<Option<Value>, ScriptError> {
        let url = self.url_for(key);
        let url = url.as_str();
        let policy = if retry { self.retry } else { RetryPolicy::single() };

        policy
            .run_transient(move || self.fetch_metadata(url, recursive))
            .await
    }
}

//! Script retriever
//!
//! Reads attributes from the metadata server and stages the scripts they
//! declare for one script type (`startup`, `shutdown`, ...).
//!
//! Instance attributes win over project attributes as a whole: when the
//! instance declares any script of this type, project attributes are not
//! consulted at all. The two are never merged.

use reqwest::header::{AUTHORIZATION, LOCATION};
use reqwest::{Client, Response, StatusCode, Url, redirect};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::staging::{reserve_file, stage_inline, write_script};
use super::url::{ScriptSource, classify};
use super::{Attributes, ScriptKind, ScriptMap, attribute_value, scope_attributes};
use crate::ScriptError;
use crate::config::RetrieverSettings;
use crate::metadata::{GceMetadata, METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE, MetadataWatcher};
use crate::retry::RetryPolicy;

/// Metadata key holding the default service account's access token
pub const TOKEN_METADATA_KEY: &str = "instance/service-accounts/default/token";

/// Retrieves and stages metadata scripts of one type
///
/// The service account token used for Cloud Storage downloads is fetched
/// on first use and reused for the lifetime of the retriever. It is only
/// discarded when a download is rejected with `401 Unauthorized`.
///
/// Credentialed requests go through a client that does not follow
/// redirects; a redirect target is fetched with the plain client, so the
/// `Authorization` and `Metadata-Flavor` headers never leave the storage URL.
pub struct ScriptRetriever<W> {
    script_type: String,
    watcher: W,
    client: Client,
    auth_client: Client,
    retry: RetryPolicy,
    token: Option<String>,
}

impl ScriptRetriever<GceMetadata> {
    /// Retriever backed by the real metadata server
    pub fn from_settings(
        script_type: impl Into<String>,
        settings: &RetrieverSettings,
    ) -> Result<Self, ScriptError> {
        let watcher = GceMetadata::new(settings)?;
        Self::new(script_type, watcher, settings)
    }
}

impl<W: MetadataWatcher> ScriptRetriever<W> {
    pub fn new(
        script_type: impl Into<String>,
        watcher: W,
        settings: &RetrieverSettings,
    ) -> Result<Self, ScriptError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(settings.connect_timeout())
            .build()?;

        let auth_client = Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(settings.connect_timeout())
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            script_type: script_type.into(),
            watcher,
            client,
            auth_client,
            retry: settings.retry_policy(),
            token: None,
        })
    }

    /// Override the retry policy for downloads
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn watcher(&self) -> &W {
        &self.watcher
    }

    /// Cached `Authorization` value, if one has been fetched
    pub fn cached_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Fetch the scripts to run and stage them in `dest_dir`
    ///
    /// Instance attributes are tried first. Only if they declare no script
    /// of this type are project attributes used instead.
    pub async fn get_scripts(&mut self, dest_dir: &Path) -> ScriptMap {
        let tree = match self.watcher.get_metadata(None, true, true).await {
            Ok(Some(tree)) => tree,
            Ok(None) => Value::Null,
            Err(e) => {
                warn!("Could not read metadata: {}", e);
                Value::Null
            }
        };

        let instance = scope_attributes(&tree, "instance");
        if instance.is_none() {
            warn!("Instance attributes were not found.");
        }

        let project = scope_attributes(&tree, "project");
        if project.is_none() {
            warn!("Project attributes were not found.");
        }

        let scripts = self.get_attribute_scripts(instance, dest_dir).await;
        if !scripts.is_empty() {
            return scripts;
        }

        self.get_attribute_scripts(project, dest_dir).await
    }

    /// Stage the scripts declared in one attribute map
    ///
    /// Inline and URL scripts are independent; both may be present. A
    /// declared script that could not be staged is recorded with `None`.
    pub async fn get_attribute_scripts(
        &mut self,
        attributes: Option<&Attributes>,
        dest_dir: &Path,
    ) -> ScriptMap {
        let mut scripts = ScriptMap::new();
        let Some(attributes) = attributes else {
            return scripts;
        };

        let key = ScriptKind::Inline.metadata_key(&self.script_type);
        if let Some(body) = attribute_value(attributes, &key) {
            info!("Found {} in metadata.", key);
            let staged = match stage_inline(body, dest_dir).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Could not stage {}: {}", key, e);
                    None
                }
            };
            scripts.insert(key, staged);
        }

        let key = ScriptKind::Url.metadata_key(&self.script_type);
        if let Some(url) = attribute_value(attributes, &key) {
            info!("Found {} in metadata.", key);
            let staged = match self.download_script(url, dest_dir).await {
                Ok(path) => Some(path),
                Err(e) => {
                    debug!("Download of {} failed: {}", key, e);
                    warn!("Failed to download metadata script.");
                    None
                }
            };
            scripts.insert(key, staged);
        }

        scripts
    }

    /// Download `url` into a new file in `dest_dir`
    ///
    /// Cloud Storage URLs go through the authenticated path; everything else
    /// is downloaded without credentials.
    pub async fn download_script(&mut self, url: &str, dest_dir: &Path) -> Result<PathBuf, ScriptError> {
        match classify(url) {
            ScriptSource::Storage(url) => self.download_auth_url(&url, dest_dir).await,
            ScriptSource::Plain(url) => self.download_url(&url, dest_dir).await,
        }
    }

    /// Download with the service account token, falling back to an
    /// unauthenticated download when no token is available
    pub async fn download_auth_url(&mut self, url: &str, dest_dir: &Path) -> Result<PathBuf, ScriptError> {
        let dest = reserve_file(dest_dir)?;

        info!(
            "Downloading url from {} to {} using authentication token.",
            url,
            dest.display()
        );

        let token = match self.token.clone() {
            Some(token) => token,
            None => match self.fetch_token().await {
                Some(token) => {
                    self.token = Some(token.clone());
                    token
                }
                None => {
                    info!("Authentication token not found. Attempting unauthenticated download.");
                    return self.download_url(url, dest_dir).await;
                }
            },
        };

        let auth_client = &self.auth_client;
        let client = &self.client;
        let token = token.as_str();
        let fetched = self
            .retry
            .run_transient(move || fetch_with_token(auth_client, client, url, token))
            .await
            .and_then(|body| String::from_utf8(body).map_err(ScriptError::from));

        let content = match fetched {
            Ok(content) => content,
            Err(e) => {
                if e.status() == Some(StatusCode::UNAUTHORIZED) {
                    debug!("Discarding rejected authentication token");
                    self.token = None;
                }
                warn!("Could not download {}. {}.", url, e);
                return Err(e);
            }
        };

        write_script(&dest, content.as_bytes()).await?;
        Ok(dest)
    }

    /// Download without credentials
    pub async fn download_url(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, ScriptError> {
        let dest = reserve_file(dest_dir)?;

        info!("Downloading url from {} to {}.", url, dest.display());

        let client = &self.client;
        let target = dest.as_path();
        let result = self
            .retry
            .run_transient(move || fetch_to_file(client, url, target))
            .await;

        match result {
            Ok(()) => Ok(dest),
            Err(e) if e.is_transient() => {
                warn!("Could not download {}. {}.", url, e);
                Err(e)
            }
            Err(e) => {
                warn!("Exception downloading {}. {}.", url, e);
                Err(e)
            }
        }
    }

    /// Ask the metadata server for the default service account token
    ///
    /// Returns the `Authorization` header value, or `None` when no usable
    /// token is available.
    async fn fetch_token(&self) -> Option<String> {
        let response = match self
            .watcher
            .get_metadata(Some(TOKEN_METADATA_KEY), false, false)
            .await
        {
            Ok(response) => response?,
            Err(e) => {
                warn!("Could not fetch authentication token: {}", e);
                return None;
            }
        };

        compose_token(&response)
    }
}

/// Build `"<token_type> <access_token>"` from a token response
///
/// Missing fields count as empty. An empty response carries no token.
fn compose_token(response: &Value) -> Option<String> {
    let Value::Object(fields) = response else {
        if !response.is_null() && response.as_str() != Some("") {
            warn!("Unexpected authentication token response format.");
        }
        return None;
    };

    if fields.is_empty() {
        return None;
    }

    Some(format!(
        "{} {}",
        string_field(fields, "token_type"),
        string_field(fields, "access_token")
    ))
}

fn string_field<'a>(fields: &'a serde_json::Map<String, Value>, name: &str) -> &'a str {
    fields.get(name).and_then(Value::as_str).unwrap_or("")
}

/// One authenticated GET; returns the raw body
///
/// A redirect is followed once through `client` without the credential
/// headers; any further redirects follow that client's default policy.
async fn fetch_with_token(
    auth_client: &Client,
    client: &Client,
    url: &str,
    token: &str,
) -> Result<Vec<u8>, ScriptError> {
    let response = auth_client
        .get(url)
        .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
        .header(AUTHORIZATION, token)
        .send()
        .await?;

    let response = match redirect_target(&response)? {
        Some(target) => {
            debug!("Following redirect from {} to {} without credentials", url, target);
            client.get(target).send().await?
        }
        None => response,
    };

    let response = response.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

/// Absolute redirect target of a 3xx response
fn redirect_target(response: &Response) -> Result<Option<Url>, ScriptError> {
    if !response.status().is_redirection() {
        return Ok(None);
    }

    let location = response
        .headers()
        .get(LOCATION)
        .ok_or_else(|| {
            ScriptError::InvalidData(format!("{} redirect without Location", response.status()))
        })?
        .to_str()
        .map_err(|e| ScriptError::InvalidData(format!("Invalid redirect Location: {}", e)))?;

    response
        .url()
        .join(location)
        .map(Some)
        .map_err(|e| ScriptError::InvalidData(format!("Invalid redirect Location {}: {}", location, e)))
}

/// One unauthenticated GET saved straight to `dest`
async fn fetch_to_file(client: &Client, url: &str, dest: &Path) -> Result<(), ScriptError> {
    let response = client.get(url).send().await?.error_for_status()?;
    let body = response.bytes().await?;
    write_script(dest, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::mock::MockMetadata;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn retriever(mock: MockMetadata) -> ScriptRetriever<MockMetadata> {
        ScriptRetriever::new("startup", mock, &RetrieverSettings::default())
            .unwrap()
            .with_retry_policy(RetryPolicy::new(3, Duration::ZERO))
    }

    fn attributes(value: Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_compose_token() {
        assert_eq!(
            compose_token(&json!({"token_type": "Bearer", "access_token": "ya29.abc", "expires_in": 3599})),
            Some("Bearer ya29.abc".to_string())
        );
        assert_eq!(
            compose_token(&json!({"access_token": "ya29.abc"})),
            Some(" ya29.abc".to_string())
        );
        assert_eq!(compose_token(&json!({})), None);
        assert_eq!(compose_token(&json!("")), None);
        assert_eq!(compose_token(&json!("opaque")), None);
    }

    #[tokio::test]
    async fn test_inline_script_is_staged() {
        let temp = TempDir::new().unwrap();
        let mut retriever = retriever(MockMetadata::new());

        let attrs = attributes(json!({"startup-script": "  echo hi"}));
        let scripts = retriever.get_attribute_scripts(Some(&attrs), temp.path()).await;

        assert_eq!(scripts.len(), 1);
        let path = scripts["startup-script"].as_ref().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "echo hi");
    }

    #[tokio::test]
    async fn test_other_script_types_are_ignored() {
        let temp = TempDir::new().unwrap();
        let mut retriever = retriever(MockMetadata::new());

        let attrs = attributes(json!({
            "shutdown-script": "halt",
            "startup-script": "",
        }));
        let scripts = retriever.get_attribute_scripts(Some(&attrs), temp.path()).await;

        assert!(scripts.is_empty());
    }

    #[tokio::test]
    async fn test_absent_attributes_yield_nothing() {
        let temp = TempDir::new().unwrap();
        let mut retriever = retriever(MockMetadata::new());

        let scripts = retriever.get_attribute_scripts(None, temp.path()).await;
        assert!(scripts.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_url_recorded_as_none() {
        let temp = TempDir::new().unwrap();
        let mut retriever = retriever(MockMetadata::new());

        // Nothing listens on port 9 locally, so every attempt is refused
        let attrs = attributes(json!({"startup-script-url": "http://127.0.0.1:9/x"}));
        let scripts = retriever.get_attribute_scripts(Some(&attrs), temp.path()).await;

        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts.get("startup-script-url"), Some(&None));
    }

    #[tokio::test]
    async fn test_inline_staging_failure_recorded_as_none() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        let mut retriever = retriever(MockMetadata::new());

        let attrs = attributes(json!({"startup-script": "echo hi"}));
        let scripts = retriever.get_attribute_scripts(Some(&attrs), &missing).await;

        assert_eq!(scripts.get("startup-script"), Some(&None));
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn test_get_scripts_without_metadata() {
        let temp = TempDir::new().unwrap();
        let mut retriever = retriever(MockMetadata::new());

        let scripts = retriever.get_scripts(temp.path()).await;

        assert!(scripts.is_empty());
        assert_eq!(retriever.watcher().requests(), vec!["".to_string()]);
    }

    #[tokio::test]
    async fn test_get_scripts_metadata_error_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        let mut retriever = retriever(MockMetadata::new().with_error("", "metadata server down"));

        let scripts = retriever.get_scripts(temp.path()).await;
        assert!(scripts.is_empty());
    }

    #[tokio::test]
    async fn test_token_error_falls_back_to_plain_download() {
        let temp = TempDir::new().unwrap();
        let mock = MockMetadata::new().with_error(TOKEN_METADATA_KEY, "no service account");
        let mut retriever = retriever(mock);

        let result = retriever
            .download_auth_url("http://127.0.0.1:9/bucket/o", temp.path())
            .await;

        assert!(result.is_err());
        assert!(retriever.cached_token().is_none());
        assert_eq!(retriever.watcher().request_count(TOKEN_METADATA_KEY), 1);
    }
}

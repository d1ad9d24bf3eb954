//! Mock metadata server for testing
//!
//! Provides a configurable [`MetadataWatcher`] that serves canned values and
//! records which keys were requested.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use super::MetadataWatcher;
use crate::ScriptError;

/// Key under which the full metadata tree is stored
const ROOT_KEY: &str = "";

/// Mock metadata source for testing
///
/// # Example
/// ```
/// use gce_metadata_scripts::metadata::mock::MockMetadata;
/// use serde_json::json;
///
/// let mock = MockMetadata::new()
///     .with_tree(json!({"instance": {"attributes": {"startup-script": "echo hi"}}}))
///     .with_value("instance/service-accounts/default/token", json!({
///         "token_type": "Bearer",
///         "access_token": "ya29.test",
///     }));
/// ```
#[derive(Default)]
pub struct MockMetadata {
    values: HashMap<String, Value>,
    errors: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl MockMetadata {
    /// Create an empty mock; every key is absent
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value returned for the full tree
    pub fn with_tree(self, tree: Value) -> Self {
        self.with_value(ROOT_KEY, tree)
    }

    /// Set the value returned for `key`
    pub fn with_value(mut self, key: &str, value: Value) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    /// Configure to return an error for `key`
    pub fn with_error(mut self, key: &str, error: &str) -> Self {
        self.errors.insert(key.to_string(), error.to_string());
        self
    }

    /// Keys requested so far, in order; the full tree is recorded as `""`
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of times `key` was requested
    pub fn request_count(&self, key: &str) -> usize {
        self.requests().iter().filter(|k| k.as_str() == key).count()
    }
}

#[async_trait]
impl MetadataWatcher for MockMetadata {
    async fn get_metadata(
        &self,
        key: Option<&str>,
        _recursive: bool,
        _retry: bool,
    ) -> Result<Option<Value>, ScriptError> {
        let key = key.unwrap_or(ROOT_KEY);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(key.to_string());

        if let Some(error) = self.errors.get(key) {
            return Err(ScriptError::Metadata(error.clone()));
        }

        Ok(self.values.get(key).cloned())
    }
}

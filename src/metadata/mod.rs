//! Metadata server access
//!
//! The retriever only needs one capability from the metadata server: fetch
//! the value stored under a key, optionally with all of its children. That
//! capability is the [`MetadataWatcher`] trait; [`gce::GceMetadata`] talks to
//! the real server and [`mock::MockMetadata`] serves canned values in tests.

pub mod gce;
pub mod mock;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::ScriptError;

pub use gce::{GCE_METADATA_URL, GceMetadata};

/// Required header for GCE metadata requests
pub const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
pub const METADATA_FLAVOR_VALUE: &str = "Google";

/// Source of instance and project metadata
#[async_trait]
pub trait MetadataWatcher: Send + Sync {
    /// Fetch the value under `key`, or the whole tree when `key` is `None`.
    ///
    /// `recursive` asks for the key's children as a nested object. `retry`
    /// asks the implementation to retry transient failures itself. A key
    /// the server does not have yields `Ok(None)`.
    async fn get_metadata(
        &self,
        key: Option<&str>,
        recursive: bool,
        retry: bool,
    ) -> Result<Option<Value>, ScriptError>;
}

#[async_trait]
impl<T: MetadataWatcher + ?Sized> MetadataWatcher for Box<T> {
    async fn get_metadata(
        &self,
        key: Option<&str>,
        recursive: bool,
        retry: bool,
    ) -> Result<Option<Value>, ScriptError> {
        (**self).get_metadata(key, recursive, retry).await
    }
}

#[async_trait]
impl<T: MetadataWatcher + ?Sized> MetadataWatcher for Arc<T> {
    async fn get_metadata(
        &self,
        key: Option<&str>,
        recursive: bool,
        retry: bool,
    ) -> Result<Option<Value>, ScriptError> {
        (**self).get_metadata(key, recursive, retry).await
    }
}

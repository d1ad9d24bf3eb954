//! Settings loader
//!
//! Loads and merges settings from the standard locations.

use super::{ConfigPaths, RetrieverSettings, merge};
use crate::ScriptError;
use serde_yaml::Value;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// Load and merge settings from `scripts.cfg` and its drop-ins
pub async fn load_settings(paths: &ConfigPaths) -> Result<RetrieverSettings, ScriptError> {
    let mut documents = Vec::new();

    if let Some(doc) = load_config_file(paths.main_config()).await? {
        debug!("Loaded settings from {}", paths.main_config().display());
        documents.push(doc);
    }

    documents.extend(load_dropin_configs(paths.config_d()).await?);

    let merged = merge::merge_all(&documents);
    let settings = if merged.is_null() {
        RetrieverSettings::default()
    } else {
        serde_yaml::from_value(merged)?
    };

    settings.validate()?;
    Ok(settings)
}

/// Load a single settings document
///
/// A missing file yields `None`. A file that does not parse as settings is
/// logged and skipped rather than failing the whole load.
async fn load_config_file(path: impl AsRef<Path>) -> Result<Option<Value>, ScriptError> {
    let path = path.as_ref();

    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).await?;

    let value: Value = match serde_yaml::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to parse {}: {}", path.display(), e);
            return Ok(None);
        }
    };

    if value.is_null() {
        return Ok(None);
    }

    if let Err(e) = serde_yaml::from_value::<RetrieverSettings>(value.clone()) {
        warn!("Ignoring {}: {}", path.display(), e);
        return Ok(None);
    }

    Ok(Some(value))
}

/// Load all drop-in documents from a directory (sorted alphabetically)
async fn load_dropin_configs(dir: impl AsRef<Path>) -> Result<Vec<Value>, ScriptError> {
    let dir = dir.as_ref();

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "cfg") {
            entries.push(path);
        }
    }

    entries.sort();

    let mut documents = Vec::new();
    for path in entries {
        if let Some(doc) = load_config_file(&path).await? {
            debug!("Loaded drop-in settings from {}", path.display());
            documents.push(doc);
        }
    }

    info!("Loaded {} drop-in settings files", documents.len());
    Ok(documents)
}

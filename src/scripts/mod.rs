//! Metadata script retrieval
//!
//! Scripts are declared in instance or project attributes under two keys per
//! script type `T`:
//!
//! - `T-script` holds the script body inline
//! - `T-script-url` points at a remote script (`gs://`, a Cloud Storage
//!   HTTPS URL, or any other URL)
//!
//! Each declared script is staged into a uniquely named file in a caller
//! supplied directory. Staged files are never removed here; whoever runs the
//! scripts owns them.

pub mod retriever;
pub mod staging;
pub mod url;

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use retriever::{ScriptRetriever, TOKEN_METADATA_KEY};
pub use url::{ScriptSource, classify};

/// Scripts found in metadata, keyed by the attribute that declared them
///
/// A key is present whenever metadata declared the script. The value is the
/// staged file, or `None` when staging failed (for example the download did
/// not succeed). An absent key means the script was not declared at all.
pub type ScriptMap = BTreeMap<String, Option<PathBuf>>;

/// Attribute map of a metadata scope (`instance` or `project`)
pub type Attributes = Map<String, Value>;

/// How a script is declared in attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// Script body stored in the attribute value
    Inline,
    /// Attribute value is a URL to download
    Url,
}

impl ScriptKind {
    /// Attribute key for this kind of script, e.g. `startup-script-url`
    pub fn metadata_key(self, script_type: &str) -> String {
        match self {
            ScriptKind::Inline => format!("{}-script", script_type),
            ScriptKind::Url => format!("{}-script-url", script_type),
        }
    }
}

/// Look up `<scope>.attributes` in a metadata tree
pub fn scope_attributes<'a>(tree: &'a Value, scope: &str) -> Option<&'a Attributes> {
    tree.get(scope)?.get("attributes")?.as_object()
}

/// Non-empty string value of an attribute
pub(crate) fn attribute_value<'a>(attributes: &'a Attributes, key: &str) -> Option<&'a str> {
    attributes
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

//! Script URL classification
//!
//! Cloud Storage objects are always fetched with the instance's service
//! account token; every other URL is fetched without credentials. Patterns
//! are tried in order and must match the whole URL.
//!
//! Bucket names are lowercase alphanumerics with `-`, `_` and `.` inside;
//! a single character is accepted.

use regex::Regex;
use std::sync::LazyLock;

/// Endpoint that `gs://` references are rewritten to
pub const STORAGE_ENDPOINT: &str = "https://storage.googleapis.com/";

const GS_SCHEME: &str = "gs://";

/// `http(s)://<bucket>.storage.googleapis.com/<object>`
static VIRTUAL_HOSTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\Ahttps?://[a-z0-9](?:[-_.a-z0-9]*[a-z0-9])?\.storage\.googleapis\.com/[^*?]+\z")
        .expect("virtual-hosted storage pattern is valid")
});

/// `http(s)://(commondata)?storage.googleapis.com/<bucket>/<object>`
static PATH_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\Ahttps?://(commondata)?storage\.googleapis\.com/[a-z0-9](?:[-_.a-z0-9]*[a-z0-9])?/[^*?]+\z",
    )
    .expect("path-style storage pattern is valid")
});

/// Where and how a script URL should be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// Cloud Storage object; fetch with an authorization token
    Storage(String),
    /// Anything else; fetch without credentials
    Plain(String),
}

/// Recognized Cloud Storage URL forms, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoragePattern {
    /// `gs://<bucket>/<object>`, rewritten to the HTTPS endpoint
    GsScheme,
    VirtualHosted,
    /// Includes the deprecated `commondatastorage` host
    PathStyle,
}

const STORAGE_PATTERNS: [StoragePattern; 3] = [
    StoragePattern::GsScheme,
    StoragePattern::VirtualHosted,
    StoragePattern::PathStyle,
];

impl StoragePattern {
    /// URL to fetch if `url` has this form
    fn matches(self, url: &str) -> Option<String> {
        match self {
            StoragePattern::GsScheme => url
                .strip_prefix(GS_SCHEME)
                .map(|rest| format!("{}{}", STORAGE_ENDPOINT, rest)),
            StoragePattern::VirtualHosted => VIRTUAL_HOSTED.is_match(url).then(|| url.to_string()),
            StoragePattern::PathStyle => PATH_STYLE.is_match(url).then(|| url.to_string()),
        }
    }
}

/// Decide how to fetch a script URL
pub fn classify(url: &str) -> ScriptSource {
    STORAGE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.matches(url))
        .map(ScriptSource::Storage)
        .unwrap_or_else(|| ScriptSource::Plain(url.to_string()))
}

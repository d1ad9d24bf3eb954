//! Error types for gce-metadata-scripts

use thiserror::Error;

/// Main error type for script retrieval operations
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metadata server error: {0}")]
    Metadata(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Script body is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl ScriptError {
    /// Whether this is a transient network fault worth another attempt.
    ///
    /// HTTP-layer failures (connect, timeout, protocol, error status) and
    /// OS-level I/O failures qualify. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Io(_))
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::Http(e) => e.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_is_transient() {
        let err = ScriptError::from(std::io::Error::other("connection reset"));
        assert!(err.is_transient());
        assert!(err.status().is_none());
    }

    #[test]
    fn test_decode_and_data_errors_are_permanent() {
        let utf8 = String::from_utf8(vec![0xff, 0xfe]).unwrap_err();
        assert!(!ScriptError::from(utf8).is_transient());
        assert!(!ScriptError::InvalidData("bad".into()).is_transient());
        assert!(!ScriptError::Metadata("gone".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = ScriptError::Config("retry_attempts must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: retry_attempts must be at least 1"
        );
    }
}

//! gce-metadata-scripts library
//!
//! Retrieves user-provided startup and shutdown scripts declared in Google
//! Compute Engine instance or project metadata and stages them on local disk
//! for a script runner to execute.
//!
//! # Design Principles
//!
//! - **Safety First**: No unsafe code (`#![forbid(unsafe_code)]`)
//! - **Never fatal**: every failure degrades to a missing or `None` script,
//!   never an error for the caller
//! - **Bounded**: every request carries a timeout and a fixed retry budget

pub mod config;
pub mod metadata;
pub mod retry;
pub mod scripts;

mod error;

pub use error::ScriptError;
pub use scripts::{ScriptMap, ScriptRetriever};

/// Well-known script types read by the guest environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    /// Runs on every boot
    Startup,
    /// Runs when the instance is stopped or rebooted
    Shutdown,
}

impl ScriptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptType::Startup => "startup",
            ScriptType::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ScriptType> for String {
    fn from(script_type: ScriptType) -> Self {
        script_type.as_str().to_string()
    }
}

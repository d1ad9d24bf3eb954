//! Staging files for scripts
//!
//! Every script lands in its own uniquely named file inside the destination
//! directory. Names are allocated atomically by the filesystem, so staging
//! never overwrites an existing file. The directory itself must already exist.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::ScriptError;

/// Prefix for staged script file names
const STAGED_PREFIX: &str = "script-";

/// Reserve a new empty file in `dest_dir` and return its path
///
/// The file is created and closed immediately so the path stays reserved
/// even if nothing is ever written to it.
pub fn reserve_file(dest_dir: &Path) -> Result<PathBuf, ScriptError> {
    let file = tempfile::Builder::new()
        .prefix(STAGED_PREFIX)
        .tempfile_in(dest_dir)?;
    let (_, path) = file.keep().map_err(|e| ScriptError::Io(e.error))?;
    debug!("Reserved staging file {}", path.display());
    Ok(path)
}

/// Write a script body into a previously reserved file
pub async fn write_script(path: &Path, body: &[u8]) -> Result<(), ScriptError> {
    fs::write(path, body).await?;
    Ok(())
}

/// Stage an inline script body, dropping leading whitespace
pub async fn stage_inline(body: &str, dest_dir: &Path) -> Result<PathBuf, ScriptError> {
    let path = reserve_file(dest_dir)?;
    write_script(&path, body.trim_start().as_bytes()).await?;
    Ok(path)
}

//! Atomic file replacement.

use crate::error::{Result, ResultExt};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Replace `path` with `bytes` so readers see either the old or the new file.
///
/// The content is written to a temporary file in the same directory, synced,
/// then renamed over the target. On any error the target is untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .context(format!("Creating directory '{}'", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .context(format!("Creating temporary file in '{}'", parent.display()))?;
    tmp.write_all(bytes).context("Writing temporary file")?;
    tmp.as_file().sync_all().context("Syncing temporary file")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .context(format!("Replacing '{}'", path.display()))?;

    debug!("Atomically wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Copy `from` over `to` atomically. Returns `false` when `from` does not exist.
pub fn copy_atomic(from: &Path, to: &Path) -> Result<bool> {
    if !from.exists() {
        return Ok(false);
    }
    let bytes = fs::read(from).context(format!("Reading '{}'", from.display()))?;
    write_atomic(to, &bytes)?;
    Ok(true)
}

// packages/engine/src/utils/fs.rs
//! Atomic file writes
//!
//! Data is written to a temporary file in the destination directory and then
//! renamed over the target, so readers observe either the old content or the
//! new content, never a partial file.

use crate::utils::errors::{EngineError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Atomically replace `path` with `data`, creating parent directories
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| EngineError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| EngineError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| EngineError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| EngineError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| EngineError::io(path, e.error))?;

    debug!("Atomically wrote {} bytes to {:?}", data.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_parents() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b").join("out.yaml");

        atomic_write(&target, b"rules: []\n").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"rules: []\n");
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.yaml");

        atomic_write(&target, b"old").unwrap();
        atomic_write(&target, b"new").unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        // no temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}

//! Atomic file writes for report artifacts.
//!
//! Each artifact is staged in a `<name>.<ext>.tmp` sibling and renamed over
//! the target, so readers see either the previous file or the complete new one.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Sibling path an artifact is staged under before the rename.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("artifact"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replace `path` with `data`, creating parent directories.
///
/// The staged file is removed again if the write or the rename fails.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = staging_path(path);
    let written = std::fs::write(&tmp, data).and_then(|()| std::fs::rename(&tmp, path));
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}

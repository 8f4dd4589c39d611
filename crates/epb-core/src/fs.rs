//! Filesystem helpers
//!
//! - [`atomic_write`]: replace a file without exposing a partial write
//! - [`copy_dir_recursive`]: stage the EddyPro binaries next to a run
//! - [`collect_output_files`]: find the result tables EddyPro produced

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::BatchError;

/// Result table kinds EddyPro writes per run
pub const OUTPUT_KINDS: &[&str] = &["fluxnet", "full_output", "metadata", "qc_details"];

/// Write `data` to `path` through a sibling temp file and a rename
///
/// # Errors
/// Returns [`BatchError::Io`] if the temp file cannot be written or renamed.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), BatchError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| BatchError::io_error(parent, e))?;

    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".tmp_{}_{file_name}", std::process::id()));

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&temp_path);
        return Err(BatchError::io_error(&temp_path, e));
    }
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        BatchError::io_error(path, e)
    })
}

/// Copy `src` into `dst`, creating directories as needed
///
/// Existing files in `dst` are overwritten.
///
/// # Errors
/// Returns [`BatchError::Io`] naming the entry that failed.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), BatchError> {
    fs::create_dir_all(dst).map_err(|e| BatchError::io_error(dst, e))?;
    let entries = fs::read_dir(src).map_err(|e| BatchError::io_error(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| BatchError::io_error(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| BatchError::io_error(&from, e))?;
        if file_type.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|e| BatchError::io_error(&from, e))?;
        }
    }
    Ok(())
}

/// Whether `name` is an EddyPro result table for `site_id`
#[must_use]
pub fn is_output_file(name: &str, site_id: &str) -> bool {
    let Some(rest) = name
        .strip_prefix("eddypro_")
        .and_then(|r| r.strip_prefix(site_id))
        .and_then(|r| r.strip_prefix('_'))
    else {
        return false;
    };
    if !rest.ends_with(".csv") {
        return false;
    }
    OUTPUT_KINDS.iter().any(|kind| {
        rest.strip_prefix(kind)
            .is_some_and(|tail| tail.starts_with('_'))
    })
}

/// Collect result tables for `site_id` under `dir`, as absolute sorted paths
///
/// A missing directory yields an empty list.
///
/// # Errors
/// Returns [`BatchError::Io`] if an existing directory cannot be read.
pub fn collect_output_files(dir: &Path, site_id: &str) -> Result<Vec<PathBuf>, BatchError> {
    let mut found = Vec::new();
    if dir.is_dir() {
        walk(dir, site_id, &mut found)?;
    }
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, site_id: &str, found: &mut Vec<PathBuf>) -> Result<(), BatchError> {
    let entries = fs::read_dir(dir).map_err(|e| BatchError::io_error(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| BatchError::io_error(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, site_id, found)?;
        } else if is_output_file(&entry.file_name().to_string_lossy(), site_id) {
            let absolute = path
                .canonicalize()
                .map_err(|e| BatchError::io_error(&path, e))?;
            found.push(absolute);
        }
    }
    Ok(())
}

//! Preflight checks run on a patched project before EddyPro starts
//!
//! EddyPro aborts with opaque fatal errors when its input directory is empty
//! or the static metadata lacks wind and temperature variables. These checks
//! surface the same conditions as readable messages.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::document::ConfigDocument;
use crate::error::IniError;

/// Variables EddyPro needs declared in `[FileDescription]`
pub const REQUIRED_VARIABLES: &[&str] = &["u", "v", "w", "ts"];

fn csv_files(dir: &Path) -> Result<Vec<PathBuf>, IniError> {
    let entries = fs::read_dir(dir).map_err(|e| IniError::io_error(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| IniError::io_error(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Check that `RawProcess_General.data_path` holds raw CSV files
///
/// Returns the number of CSV files found.
///
/// # Errors
/// Returns [`IniError::PreflightError`] if the path is empty, missing, not a
/// directory, or contains no `*.csv` file.
pub fn validate_inputs_preflight(doc: &ConfigDocument) -> Result<usize, IniError> {
    let raw = doc
        .get("RawProcess_General", "data_path")
        .unwrap_or_default()
        .trim();
    if raw.is_empty() {
        return Err(IniError::PreflightError(
            "RawProcess_General.data_path is empty; cannot proceed without an input data directory"
                .to_string(),
        ));
    }

    let data_path = Path::new(raw);
    if !data_path.exists() {
        return Err(IniError::PreflightError(format!(
            "RawProcess_General.data_path does not exist: {}",
            data_path.display()
        )));
    }
    if !data_path.is_dir() {
        return Err(IniError::PreflightError(format!(
            "RawProcess_General.data_path is not a directory: {}",
            data_path.display()
        )));
    }

    let files = csv_files(data_path)?;
    if files.is_empty() {
        return Err(IniError::PreflightError(format!(
            "No CSV files found in data_path: {}; EddyPro would stop with Fatal error(86)",
            data_path.display()
        )));
    }

    tracing::info!(
        "Preflight check passed: {} CSV file(s) found in {}",
        files.len(),
        data_path.display()
    );

    if let Some(prototype) = doc.get("Project", "file_prototype") {
        if prototype.contains('?') {
            let sample: Vec<String> = files
                .iter()
                .take(3)
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect();
            tracing::debug!(
                "Sample files in directory: {:?}; ensure prototype '{}' matches",
                sample,
                prototype
            );
        }
    }

    Ok(files.len())
}

/// Check the static metadata file the project points at
///
/// # Errors
/// Returns [`IniError::PreflightError`] if `Project.proj_file` is empty or
/// not a file, cannot be parsed, lacks `[FileDescription]`, or does not
/// declare every variable in [`REQUIRED_VARIABLES`].
pub fn validate_metadata_preflight(doc: &ConfigDocument) -> Result<(), IniError> {
    let raw = doc.get("Project", "proj_file").unwrap_or_default().trim();
    if raw.is_empty() {
        return Err(IniError::PreflightError(
            "Project.proj_file is empty; it must point to the static .metadata file".to_string(),
        ));
    }

    let meta_path = Path::new(raw);
    if !meta_path.is_file() {
        return Err(IniError::PreflightError(format!(
            "Static metadata file not found: {}",
            meta_path.display()
        )));
    }

    let metadata = ConfigDocument::load(meta_path).map_err(|e| {
        IniError::PreflightError(format!(
            "Failed to parse metadata file {}: {e}",
            meta_path.display()
        ))
    })?;

    let description = metadata.section("FileDescription").ok_or_else(|| {
        IniError::PreflightError(format!(
            "Metadata file {} missing [FileDescription] section",
            meta_path.display()
        ))
    })?;

    let declared: BTreeSet<&str> = description
        .iter()
        .filter(|(key, _)| key.ends_with("_variable"))
        .map(|(_, value)| value.trim())
        .collect();

    let missing: Vec<&str> = REQUIRED_VARIABLES
        .iter()
        .copied()
        .filter(|var| !declared.contains(var))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !missing.is_empty() {
        return Err(IniError::PreflightError(format!(
            "Metadata is missing required variables: {}",
            missing.join(", ")
        )));
    }

    tracing::info!(
        "Metadata validation passed for {} (vars present: {:?})",
        meta_path.display(),
        declared
    );
    Ok(())
}

//! Patch operations on a project template
//!
//! Each operation touches only the keys it names; everything else in the
//! document is carried through unchanged.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use epb_scenario::{parameter_spec, ROT_METH_PLANAR_FIT, TLAG_METH_OPTIMIZATION};

use crate::document::{to_forward_slashes, ConfigDocument};
use crate::error::IniError;

/// Timestamp layout used by EddyPro project files
pub const PROJECT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const PROJECT: &str = "Project";
const RAW_GENERAL: &str = "RawProcess_General";
const RAW_SETTINGS: &str = "RawProcess_Settings";
const TILT_SETTINGS: &str = "RawProcess_TiltCorrection_Settings";
const TIMELAG_SETTINGS: &str = "RawProcess_TimelagOptimization_Settings";

/// Paths written into the `Project` and `RawProcess_General` sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPathsRequest {
    /// Static `.metadata` file
    pub proj_file: PathBuf,
    /// Dynamic metadata table
    pub dyn_metadata_file: PathBuf,
    /// Raw input directory
    pub data_path: PathBuf,
    /// Output directory
    pub out_path: PathBuf,
}

/// Write validated parameter values under their on-disk keys
///
/// # Errors
/// - [`IniError::UnknownParameter`] if a name is not in the parameter table
/// - [`IniError::MissingSection`] if the owning section is absent
pub fn patch_parameters(
    doc: &mut ConfigDocument,
    parameters: &BTreeMap<String, i64>,
) -> Result<(), IniError> {
    for (name, value) in parameters {
        let spec = parameter_spec(name).ok_or_else(|| IniError::UnknownParameter(name.clone()))?;
        if !doc.has_section(spec.section) {
            return Err(IniError::missing_section(
                spec.section,
                format!("needed for parameter '{name}'"),
            ));
        }
        doc.set(spec.section, spec.ini_key, value.to_string())?;
        tracing::debug!("Set {}.{} = {}", spec.section, spec.ini_key, value);
    }
    Ok(())
}

/// Point the project at its metadata, input and output locations
///
/// Paths are written with forward slashes, and the two "use file" flags are
/// forced on so the metadata paths take effect.
///
/// # Errors
/// Returns [`IniError::MissingSection`] if `Project` or `RawProcess_General` is absent.
pub fn patch_paths(doc: &mut ConfigDocument, request: &PatchPathsRequest) -> Result<(), IniError> {
    for section in [PROJECT, RAW_GENERAL] {
        if !doc.has_section(section) {
            return Err(IniError::missing_section(section, "needed for path patching"));
        }
    }

    let proj_file = to_forward_slashes(&request.proj_file);
    let dyn_metadata_file = to_forward_slashes(&request.dyn_metadata_file);
    let data_path = to_forward_slashes(&request.data_path);
    let out_path = to_forward_slashes(&request.out_path);

    doc.set(PROJECT, "proj_file", proj_file.as_str())?;
    doc.set(PROJECT, "dyn_metadata_file", dyn_metadata_file.as_str())?;
    doc.set(PROJECT, "out_path", out_path.as_str())?;
    doc.set(PROJECT, "use_pfile", "1")?;
    doc.set(PROJECT, "use_dyn_md_file", "1")?;
    doc.set(RAW_GENERAL, "data_path", data_path.as_str())?;

    tracing::debug!(
        "Patched paths: proj_file={}, dyn_metadata_file={}, out_path={}, data_path={}",
        proj_file,
        dyn_metadata_file,
        out_path,
        data_path
    );
    Ok(())
}

/// Refresh project identity fields using the local clock
///
/// # Errors
/// Returns [`IniError::MissingSection`] if `Project` is absent.
pub fn patch_project_metadata(
    doc: &mut ConfigDocument,
    site_id: &str,
    year: i32,
    suffix: &str,
) -> Result<(), IniError> {
    patch_project_metadata_at(doc, site_id, year, suffix, Local::now().naive_local())
}

/// Refresh project identity fields as of `now`
///
/// `creation_date` is only filled when blank; `last_change_date` is always
/// replaced.
///
/// # Errors
/// Returns [`IniError::MissingSection`] if `Project` is absent.
pub fn patch_project_metadata_at(
    doc: &mut ConfigDocument,
    site_id: &str,
    year: i32,
    suffix: &str,
    now: NaiveDateTime,
) -> Result<(), IniError> {
    if !doc.has_section(PROJECT) {
        return Err(IniError::missing_section(PROJECT, "needed for project metadata"));
    }
    let stamp = now.format(PROJECT_DATE_FORMAT).to_string();

    let creation_blank = doc
        .get(PROJECT, "creation_date")
        .map_or(true, |v| v.trim().is_empty());
    if creation_blank {
        doc.set(PROJECT, "creation_date", stamp.as_str())?;
    }
    doc.set(PROJECT, "last_change_date", stamp.as_str())?;
    doc.set(PROJECT, "project_title", format!("{site_id} {year}{suffix}"))?;
    doc.set(PROJECT, "project_id", format!("{site_id}_{year}"))?;

    tracing::debug!(
        "Patched Project metadata: last_change_date={}, project_title={} {}{}",
        stamp,
        site_id,
        year,
        suffix
    );
    Ok(())
}

/// Fill method-specific date windows with the full processing year
///
/// Planar fit (`rot_meth=3`) and time-lag optimization (`tlag_meth=4`) each
/// need a fitting window; the two rules are checked independently.
///
/// # Errors
/// Returns [`IniError::MissingSection`] if a rule fires and its settings
/// section is absent.
pub fn patch_conditional_date_ranges(doc: &mut ConfigDocument, year: i32) -> Result<(), IniError> {
    if doc.get_int(RAW_SETTINGS, "rot_meth") == Some(ROT_METH_PLANAR_FIT) {
        if !doc.has_section(TILT_SETTINGS) {
            return Err(IniError::missing_section(
                TILT_SETTINGS,
                "rot_meth=3 (planar fit) requires it",
            ));
        }
        set_year_window(doc, TILT_SETTINGS, "pf", year)?;
        tracing::debug!("rot_meth=3: planar fit window set to {}", year);
    }

    if doc.get_int(RAW_SETTINGS, "tlag_meth") == Some(TLAG_METH_OPTIMIZATION) {
        if !doc.has_section(TIMELAG_SETTINGS) {
            return Err(IniError::missing_section(
                TIMELAG_SETTINGS,
                "tlag_meth=4 (time-lag optimization) requires it",
            ));
        }
        set_year_window(doc, TIMELAG_SETTINGS, "to", year)?;
        tracing::debug!("tlag_meth=4: time-lag optimization window set to {}", year);
    }

    Ok(())
}

fn set_year_window(
    doc: &mut ConfigDocument,
    section: &str,
    prefix: &str,
    year: i32,
) -> Result<(), IniError> {
    doc.set(section, &format!("{prefix}_start_date"), format!("{year}-01-01"))?;
    doc.set(section, &format!("{prefix}_end_date"), format!("{year}-12-31"))?;
    doc.set(section, &format!("{prefix}_start_time"), "00:00")?;
    doc.set(section, &format!("{prefix}_end_time"), "23:59")
}

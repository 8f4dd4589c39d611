//! Static `.metadata` population
//!
//! The static metadata file describes the site and instruments for one
//! processing year. It starts from a template and takes its values from the
//! ECMD row in force for that year.

use std::path::{Path, PathBuf};

use epb_ecmd::MetadataRow;

use crate::document::{to_forward_slashes, write_text, ConfigDocument};
use crate::error::IniError;

/// First line of every metadata file EddyPro writes
pub const METADATA_HEADER: &str = ";GHG_METADATA";

/// Sections a metadata template must provide
pub const REQUIRED_METADATA_SECTIONS: &[&str] =
    &["Project", "Site", "Station", "Timing", "Instruments"];

/// (section, key, ECMD column) for values that must be present
const REQUIRED_FIELDS: &[(&str, &str, &str)] = &[
    ("Site", "altitude", "ALTITUDE"),
    ("Site", "canopy_height", "CANOPY_HEIGHT"),
    ("Site", "latitude", "LATITUDE"),
    ("Site", "longitude", "LONGITUDE"),
    ("Timing", "acquisition_frequency", "ACQUISITION_FREQUENCY"),
    ("Timing", "file_duration", "FILE_DURATION"),
    ("Instruments", "instr_1_height", "SA_HEIGHT"),
    ("Instruments", "instr_1_wformat", "SA_WIND_DATA_FORMAT"),
    ("Instruments", "instr_1_wref", "SA_NORTH_ALIGNEMENT"),
    ("Instruments", "instr_1_north_offset", "SA_NORTH_OFFSET"),
    ("Instruments", "instr_2_northward_separation", "GA_NORTHWARD_SEPARATION"),
    ("Instruments", "instr_2_eastward_separation", "GA_EASTWARD_SEPARATION"),
    ("Instruments", "instr_2_vertical_separation", "GA_VERTICAL_SEPARATION"),
];

/// Closed-path values, written only when the row has them
const TUBE_FIELDS: &[(&str, &str, &str)] = &[
    ("Instruments", "instr_2_tube_length", "GA_TUBE_LENGTH"),
    ("Instruments", "instr_2_tube_diameter", "GA_TUBE_DIAMETER"),
    ("Instruments", "instr_2_tube_flowrate", "GA_FLOWRATE"),
];

/// Where and for whom the static metadata file is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTarget {
    /// `.metadata` file, already holding the template
    pub metadata_path: PathBuf,
    /// Site identifier
    pub site_id: String,
    /// Directory recorded in `Project.file_name`
    pub output_dir: PathBuf,
}

/// Write `doc` as a metadata file: the header line, then the sections
///
/// The file ends with a single newline after the last key.
///
/// # Errors
/// Returns [`IniError::Io`] on filesystem failure.
pub fn write_metadata_file(doc: &ConfigDocument, path: &Path) -> Result<(), IniError> {
    let body = doc.to_ini_string();
    let text = format!("{METADATA_HEADER}\n{}\n", body.trim_end());
    write_text(path, &text)?;
    tracing::debug!("Wrote metadata file to {}", path.display());
    Ok(())
}

/// Fill the metadata template at `metadata_path` from an ECMD row, in place
///
/// # Errors
/// - [`IniError::TemplateNotFound`] if the file does not exist
/// - [`IniError::MissingSection`] if a required section is absent
/// - [`IniError::MissingValue`] if a required ECMD value is blank
pub fn populate_metadata_file(
    metadata_path: &Path,
    site_id: &str,
    output_dir: &Path,
    row: &MetadataRow,
) -> Result<(), IniError> {
    let mut doc = ConfigDocument::load(metadata_path)?;

    if let Some(missing) = REQUIRED_METADATA_SECTIONS
        .iter()
        .find(|section| !doc.has_section(section))
    {
        return Err(IniError::missing_section(
            *missing,
            format!("metadata template {}", metadata_path.display()),
        ));
    }

    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|(_, _, column)| row.get_non_empty(column).is_none())
        .map(|(_, _, column)| (*column).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(IniError::MissingValue {
            fields: missing,
            context: format!("ECMD row for site {site_id}"),
        });
    }

    let file_name = to_forward_slashes(&output_dir.join(format!("{site_id}.metadata")));
    doc.set("Project", "file_name", file_name)?;
    doc.set("Site", "site_id", site_id)?;
    doc.set("Station", "station_id", site_id)?;
    doc.set("Station", "station_name", site_id)?;

    for (section, key, column) in REQUIRED_FIELDS {
        if let Some(value) = row.get_non_empty(column) {
            doc.set(section, key, value)?;
        }
    }
    for (section, key, column) in TUBE_FIELDS {
        if let Some(value) = row.get_non_empty(column) {
            doc.set(section, key, value)?;
        }
    }

    write_metadata_file(&doc, metadata_path)?;
    tracing::info!(
        "Populated metadata {} for site {} (ECMD effective {})",
        metadata_path.display(),
        site_id,
        row.effective_date()
    );
    Ok(())
}

/// Write the project file, then populate its static metadata
///
/// # Errors
/// Propagates write and population errors.
pub fn write_project_file_with_metadata(
    doc: &ConfigDocument,
    project_path: &Path,
    target: &MetadataTarget,
    row: &MetadataRow,
) -> Result<(), IniError> {
    doc.write(project_path)?;
    populate_metadata_file(&target.metadata_path, &target.site_id, &target.output_dir, row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TEMPLATE: &str = "\
;GHG_METADATA
[Project]
title=
file_name=

[Files]
data_path=

[Site]
site_id=
altitude=
latitude=
longitude=
canopy_height=

[Station]
station_id=
station_name=

[Timing]
acquisition_frequency=
file_duration=

[Instruments]
instr_1_height=
instr_2_tube_length=
";

    fn ecmd_row(altitude: &str, with_tube: bool) -> MetadataRow {
        let mut pairs = vec![
            ("DATE_OF_VARIATION_EF", "201801010000"),
            ("SITEID", "SITE"),
            ("ALTITUDE", altitude),
            ("CANOPY_HEIGHT", "0.1"),
            ("LATITUDE", "74.48"),
            ("LONGITUDE", "-20.55"),
            ("ACQUISITION_FREQUENCY", "10"),
            ("FILE_DURATION", "30"),
            ("SA_HEIGHT", "3.16"),
            ("SA_WIND_DATA_FORMAT", "uvw"),
            ("SA_NORTH_ALIGNEMENT", "spar"),
            ("SA_NORTH_OFFSET", "60"),
            ("GA_NORTHWARD_SEPARATION", "-11"),
            ("GA_EASTWARD_SEPARATION", "-18"),
            ("GA_VERTICAL_SEPARATION", "0"),
        ];
        if with_tube {
            pairs.push(("GA_TUBE_LENGTH", "71.1"));
            pairs.push(("GA_TUBE_DIAMETER", "5.3"));
            pairs.push(("GA_FLOWRATE", "12"));
        }
        MetadataRow::from_pairs(pairs).unwrap()
    }

    fn template(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("SITE.metadata");
        fs::write(&path, TEMPLATE).unwrap();
        path
    }

    #[test]
    fn populate_sets_expected_fields() {
        let dir = TempDir::new().unwrap();
        let path = template(&dir);
        let out = dir.path().join("out");

        populate_metadata_file(&path, "SITE", &out, &ecmd_row("38", true)).unwrap();

        let doc = ConfigDocument::load(&path).unwrap();
        let expected_name = to_forward_slashes(&out.join("SITE.metadata"));
        assert_eq!(doc.get("Project", "file_name"), Some(expected_name.as_str()));
        assert_eq!(doc.get("Site", "site_id"), Some("SITE"));
        assert_eq!(doc.get("Station", "station_id"), Some("SITE"));
        assert_eq!(doc.get("Station", "station_name"), Some("SITE"));
        assert_eq!(doc.get("Site", "altitude"), Some("38"));
        assert_eq!(doc.get("Timing", "file_duration"), Some("30"));
        assert_eq!(doc.get("Instruments", "instr_1_height"), Some("3.16"));
        assert_eq!(doc.get("Instruments", "instr_2_tube_length"), Some("71.1"));
        assert_eq!(doc.get("Instruments", "instr_2_tube_flowrate"), Some("12"));
        // unrelated sections survive
        assert!(doc.has_section("Files"));
    }

    #[test]
    fn populate_skips_absent_tube_values() {
        let dir = TempDir::new().unwrap();
        let path = template(&dir);
        populate_metadata_file(&path, "SITE", dir.path(), &ecmd_row("38", false)).unwrap();

        let doc = ConfigDocument::load(&path).unwrap();
        assert_eq!(doc.get("Instruments", "instr_2_tube_length"), Some(""));
        assert_eq!(doc.get("Instruments", "instr_2_tube_diameter"), None);
    }

    #[test]
    fn populate_rejects_blank_required_value() {
        let dir = TempDir::new().unwrap();
        let path = template(&dir);
        let err = populate_metadata_file(&path, "SITE", dir.path(), &ecmd_row("", true))
            .unwrap_err();
        match err {
            IniError::MissingValue { fields, .. } => assert_eq!(fields, vec!["ALTITUDE"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn populate_rejects_missing_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("SITE.metadata");
        fs::write(&path, "[Project]\nfile_name=\n").unwrap();
        let err = populate_metadata_file(&path, "SITE", dir.path(), &ecmd_row("10", false))
            .unwrap_err();
        assert!(matches!(err, IniError::MissingSection { ref section, .. } if section == "Site"));
    }

    #[test]
    fn metadata_writer_adds_header_without_trailing_blank() {
        let dir = TempDir::new().unwrap();
        let mut doc = ConfigDocument::new();
        doc.add_section("Project");
        doc.set("Project", "file_name", "SITE.metadata").unwrap();

        let path = dir.path().join("out.metadata");
        write_metadata_file(&doc, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(";GHG_METADATA\n"));
        assert!(!text.lines().last().unwrap().trim().is_empty());
        assert!(text.ends_with("file_name=SITE.metadata\n"));
    }

    #[test]
    fn project_written_before_metadata_populated() {
        let dir = TempDir::new().unwrap();
        let metadata_path = template(&dir);
        let mut project = ConfigDocument::new();
        project.add_section("Project");
        project.set("Project", "file_name", "SITE.eddypro").unwrap();

        let project_path = dir.path().join("SITE.eddypro");
        let target = MetadataTarget {
            metadata_path: metadata_path.clone(),
            site_id: "SITE".to_string(),
            output_dir: dir.path().to_path_buf(),
        };
        write_project_file_with_metadata(&project, &project_path, &target, &ecmd_row("38", true))
            .unwrap();

        assert!(project_path.exists());
        let meta = ConfigDocument::load(&metadata_path).unwrap();
        assert_eq!(meta.get("Site", "site_id"), Some("SITE"));
    }
}

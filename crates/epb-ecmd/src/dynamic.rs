//! Dynamic metadata table
//!
//! EddyPro reads time-varying instrument settings from a CSV whose rows each
//! start at a `date`/`time`. Every site row of the ECMD log is emitted, across
//! all years, so EddyPro can match any raw-file timestamp itself.

use std::fs;
use std::path::Path;

use crate::error::EcmdError;
use crate::row::{
    missing_columns, open_reader, parse_ecmd_date, record_map, DATE_COLUMN, SITE_COLUMN,
    TUBE_COLUMNS,
};

/// ECMD column to dynamic metadata column
const COLUMN_MAP: &[(&str, &str)] = &[
    ("FILE_DURATION", "file_length"),
    ("ACQUISITION_FREQUENCY", "acquisition_frequency"),
    ("CANOPY_HEIGHT", "canopy_height"),
    ("SA_MANUFACTURER", "master_sonic_manufacturer"),
    ("SA_MODEL", "master_sonic_model"),
    ("SA_HEIGHT", "master_sonic_height"),
    ("SA_WIND_DATA_FORMAT", "master_sonic_wformat"),
    ("SA_NORTH_ALIGNEMENT", "master_sonic_wref"),
    ("SA_NORTH_OFFSET", "master_sonic_north_offset"),
    ("GA_MANUFACTURER", "co2_irga_manufacturer"),
    ("GA_MODEL", "co2_irga_model"),
    ("GA_NORTHWARD_SEPARATION", "co2_irga_northward_separation"),
    ("GA_EASTWARD_SEPARATION", "co2_irga_eastward_separation"),
    ("GA_TUBE_LENGTH", "co2_irga_tube_length"),
    ("GA_TUBE_DIAMETER", "co2_irga_tube_diameter"),
    ("GA_FLOWRATE", "co2_irga_flowrate"),
];

/// Header of the generated file
pub const DYNAMIC_METADATA_COLUMNS: &[&str] = &[
    "date",
    "time",
    "file_length",
    "acquisition_frequency",
    "canopy_height",
    "master_sonic_manufacturer",
    "master_sonic_model",
    "master_sonic_height",
    "master_sonic_wformat",
    "master_sonic_wref",
    "master_sonic_north_offset",
    "co2_irga_manufacturer",
    "co2_irga_model",
    "co2_irga_northward_separation",
    "co2_irga_eastward_separation",
    "co2_irga_tube_length",
    "co2_irga_tube_diameter",
    "co2_irga_flowrate",
    "h2o_irga_manufacturer",
    "h2o_irga_model",
    "h2o_irga_northward_separation",
    "h2o_irga_eastward_separation",
    "h2o_irga_tube_length",
    "h2o_irga_tube_diameter",
    "h2o_irga_flowrate",
];

/// Write the dynamic metadata table for `site_id`
///
/// Rows with an empty or malformed effective date are skipped with a warning.
/// The H2O analyzer columns repeat the CO2 analyzer, which is the same
/// instrument on the sites this tool targets. Returns the number of data rows
/// written.
///
/// # Errors
/// Returns an error if the ECMD file cannot be read, lacks a mapped non-tube
/// column, or the output cannot be written.
pub fn generate_dynamic_metadata(
    ecmd_path: &Path,
    output_path: &Path,
    site_id: &str,
) -> Result<usize, EcmdError> {
    let mut reader = open_reader(ecmd_path)?;
    let headers = reader.headers()?.clone();

    let required: Vec<&str> = COLUMN_MAP
        .iter()
        .map(|(ecmd, _)| *ecmd)
        .filter(|col| !TUBE_COLUMNS.contains(col))
        .collect();
    let missing = missing_columns(&headers, &required);
    if !missing.is_empty() {
        return Err(EcmdError::MissingColumns {
            path: ecmd_path.to_path_buf(),
            columns: missing,
        });
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let values = record_map(&headers, &record);
        if values.get(SITE_COLUMN).map(String::as_str) != Some(site_id) {
            continue;
        }

        let raw_date = values.get(DATE_COLUMN).map_or("", String::as_str);
        let effective = match parse_ecmd_date(raw_date) {
            Ok(date) => date,
            Err(e) => {
                tracing::warn!("Skipping ECMD row: {}", e);
                continue;
            }
        };

        let mut out = Vec::with_capacity(DYNAMIC_METADATA_COLUMNS.len());
        out.push(effective.format("%Y-%m-%d").to_string());
        out.push(effective.format("%H:%M").to_string());
        for (ecmd_col, _) in COLUMN_MAP {
            out.push(values.get(*ecmd_col).cloned().unwrap_or_default());
        }
        // h2o_irga_* mirrors the seven co2_irga_* cells
        let co2_start = out.len() - 7;
        let co2: Vec<String> = out[co2_start..].to_vec();
        out.extend(co2);
        rows.push(out);
    }

    if rows.is_empty() {
        tracing::warn!("No ECMD rows found for site {}", site_id);
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(|e| EcmdError::io_error(parent, e))?;
    }
    let mut writer = csv::Writer::from_path(output_path)?;
    writer.write_record(DYNAMIC_METADATA_COLUMNS)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(|e| EcmdError::io_error(output_path, e))?;

    tracing::info!(
        "Generated dynamic metadata: {} ({} configuration(s))",
        output_path.display(),
        rows.len()
    );
    Ok(rows.len())
}

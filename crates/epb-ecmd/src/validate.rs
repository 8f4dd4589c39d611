//! ECMD schema and sanity checks
//!
//! Both checks collect human-readable messages instead of failing fast, so a
//! single validation pass reports every problem in the file.

use std::path::Path;

use crate::row::{missing_columns, open_reader, record_map, TUBE_COLUMNS};

/// Columns the schema check requires
pub const SCHEMA_COLUMNS: &[&str] = &[
    "DATE_OF_VARIATION_EF",
    "FILE_DURATION",
    "ACQUISITION_FREQUENCY",
    "CANOPY_HEIGHT",
    "SA_MANUFACTURER",
    "SA_MODEL",
    "SA_HEIGHT",
    "SA_WIND_DATA_FORMAT",
    "SA_NORTH_ALIGNEMENT",
    "SA_NORTH_OFFSET",
    "GA_MANUFACTURER",
    "GA_MODEL",
    "GA_NORTHWARD_SEPARATION",
    "GA_EASTWARD_SEPARATION",
    "GA_VERTICAL_SEPARATION",
];

#[derive(Clone, Copy)]
enum Bound {
    Positive,
    NonNegative,
}

const SANITY_RULES: &[(&str, Bound)] = &[
    ("ACQUISITION_FREQUENCY", Bound::Positive),
    ("FILE_DURATION", Bound::Positive),
    ("CANOPY_HEIGHT", Bound::NonNegative),
    ("SA_HEIGHT", Bound::Positive),
];

/// Check that the ECMD header carries the required columns
///
/// When a `GA_PATH` column is present and the first data row says `closed`,
/// the tube columns become mandatory as well.
#[must_use]
pub fn validate_ecmd_schema(path: &Path) -> Vec<String> {
    let mut errors = Vec::new();

    let mut reader = match open_reader(path) {
        Ok(reader) => reader,
        Err(e) => {
            errors.push(e.to_string());
            return errors;
        }
    };
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            errors.push(format!("Error reading ECMD file {}: {e}", path.display()));
            return errors;
        }
    };
    if headers.iter().all(str::is_empty) {
        errors.push(format!(
            "ECMD file is empty or has no header: {}",
            path.display()
        ));
        return errors;
    }

    let missing = missing_columns(&headers, SCHEMA_COLUMNS);
    if !missing.is_empty() {
        errors.push(format!(
            "ECMD file missing required columns: {} (file: {})",
            missing.join(", "),
            path.display()
        ));
    }

    if headers.iter().any(|h| h == "GA_PATH") {
        match reader.records().next() {
            Some(Ok(record)) => {
                let values = record_map(&headers, &record);
                let ga_path = values.get("GA_PATH").map_or("", String::as_str);
                if ga_path.eq_ignore_ascii_case("closed") {
                    let missing_tube = missing_columns(&headers, TUBE_COLUMNS);
                    if !missing_tube.is_empty() {
                        errors.push(format!(
                            "ECMD file has GA_PATH='closed' but missing columns: {} \
                             (required for closed-path analyzers)",
                            missing_tube.join(", ")
                        ));
                    }
                }
            }
            Some(Err(e)) => {
                errors.push(format!("Error reading ECMD file {}: {e}", path.display()));
            }
            None => {
                errors.push(format!(
                    "ECMD file has header but no data rows: {}",
                    path.display()
                ));
            }
        }
    }

    errors
}

/// Check numeric ranges on every data row; row numbers count the header as 1
#[must_use]
pub fn validate_ecmd_sanity(path: &Path) -> Vec<String> {
    let mut errors = Vec::new();

    let mut reader = match open_reader(path) {
        Ok(reader) => reader,
        Err(e) => {
            errors.push(e.to_string());
            return errors;
        }
    };
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            errors.push(format!("Error reading ECMD file {}: {e}", path.display()));
            return errors;
        }
    };

    for (offset, record) in reader.records().enumerate() {
        let line = offset + 2;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                errors.push(format!("Error reading ECMD file {}: {e}", path.display()));
                break;
            }
        };
        let values = record_map(&headers, &record);

        for (column, bound) in SANITY_RULES {
            // an absent column reads as 0, which fails the positive checks
            let raw = values.get(*column).map_or("0", String::as_str);
            match raw.parse::<f64>() {
                Ok(value) => match bound {
                    Bound::Positive if value <= 0.0 => errors.push(format!(
                        "Row {line}: {column} must be positive, got {value}"
                    )),
                    Bound::NonNegative if value < 0.0 => errors.push(format!(
                        "Row {line}: {column} must be non-negative, got {value}"
                    )),
                    _ => {}
                },
                Err(_) => errors.push(format!(
                    "Row {line}: {column} is not a valid number: '{raw}'"
                )),
            }
        }
    }

    errors
}

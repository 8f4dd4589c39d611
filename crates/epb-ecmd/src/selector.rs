//! Time-indexed row selection
//!
//! The ECMD log records every change to a site's instrumentation as a row
//! effective from `DATE_OF_VARIATION_EF` onwards. The configuration in force
//! for a processing year is the latest row effective at or before
//! `{year}-01-01 00:00`.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::EcmdError;
use crate::row::{
    missing_columns, open_reader, parse_ecmd_date, record_map, MetadataRow, DATE_COLUMN,
    REQUIRED_COLUMNS, SITE_COLUMN,
};

fn start_of_year(year: i32) -> Result<NaiveDateTime, EcmdError> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| EcmdError::InvalidDate {
            value: year.to_string(),
            reason: "year out of range".to_string(),
        })
}

/// Pick the row in force for `site_id` at the start of `year`
///
/// Ties on the effective date keep the later row in file order.
///
/// # Errors
/// - [`EcmdError::NotFound`] / [`EcmdError::Io`] if the file cannot be opened
/// - [`EcmdError::MissingColumns`] if a required column is absent
/// - [`EcmdError::NoRowsForSite`] if no row matches `site_id`
/// - [`EcmdError::InvalidDate`] if a matching row has an empty or malformed date
/// - [`EcmdError::NoApplicableRow`] if every matching row starts after the target
pub fn select_row_for_year(
    path: &Path,
    site_id: &str,
    year: i32,
) -> Result<MetadataRow, EcmdError> {
    let target = start_of_year(year)?;
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();

    let missing = missing_columns(&headers, REQUIRED_COLUMNS);
    if !missing.is_empty() {
        return Err(EcmdError::MissingColumns {
            path: path.to_path_buf(),
            columns: missing,
        });
    }

    let mut matched = 0usize;
    let mut best: Option<MetadataRow> = None;

    for record in reader.records() {
        let record = record?;
        let values = record_map(&headers, &record);
        if values.get(SITE_COLUMN).map(String::as_str) != Some(site_id) {
            continue;
        }
        matched += 1;

        let effective = parse_ecmd_date(values.get(DATE_COLUMN).map_or("", String::as_str))?;
        if effective > target {
            continue;
        }
        if best
            .as_ref()
            .map_or(true, |current| effective >= current.effective_date())
        {
            best = Some(MetadataRow::from_pairs(values)?);
        }
    }

    if matched == 0 {
        return Err(EcmdError::NoRowsForSite {
            site_id: site_id.to_string(),
            path: path.to_path_buf(),
        });
    }

    let row = best.ok_or_else(|| EcmdError::NoApplicableRow {
        site_id: site_id.to_string(),
        year,
    })?;
    tracing::debug!(
        "Selected ECMD row for {} {} effective {} ({} candidate rows)",
        site_id,
        year,
        row.effective_date(),
        matched
    );
    Ok(row)
}

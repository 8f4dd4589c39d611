//! ECMD rows and the shared CSV reader

use std::fs::File;
use std::path::Path;

use chrono::NaiveDateTime;
use indexmap::IndexMap;

use crate::error::EcmdError;

/// Effective-date column
pub const DATE_COLUMN: &str = "DATE_OF_VARIATION_EF";

/// Site identifier column
pub const SITE_COLUMN: &str = "SITEID";

/// Layout of [`DATE_COLUMN`]
pub const ECMD_DATE_FORMAT: &str = "%Y%m%d%H%M";

/// Columns every row selection needs
pub const REQUIRED_COLUMNS: &[&str] = &[
    DATE_COLUMN,
    SITE_COLUMN,
    "ALTITUDE",
    "CANOPY_HEIGHT",
    "LATITUDE",
    "LONGITUDE",
    "ACQUISITION_FREQUENCY",
    "FILE_DURATION",
    "SA_HEIGHT",
    "SA_WIND_DATA_FORMAT",
    "SA_NORTH_ALIGNEMENT",
    "SA_NORTH_OFFSET",
    "GA_NORTHWARD_SEPARATION",
    "GA_EASTWARD_SEPARATION",
    "GA_VERTICAL_SEPARATION",
];

/// Closed-path analyzer columns; open-path sites leave them out
pub const TUBE_COLUMNS: &[&str] = &["GA_TUBE_LENGTH", "GA_TUBE_DIAMETER", "GA_FLOWRATE"];

/// Parse a `YYYYMMDDHHMM` effective date
///
/// # Errors
/// Returns [`EcmdError::InvalidDate`] for empty or malformed input.
pub fn parse_ecmd_date(value: &str) -> Result<NaiveDateTime, EcmdError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EcmdError::InvalidDate {
            value: value.to_string(),
            reason: format!("empty {DATE_COLUMN}"),
        });
    }
    NaiveDateTime::parse_from_str(trimmed, ECMD_DATE_FORMAT).map_err(|e| EcmdError::InvalidDate {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// One ECMD row: trimmed cell values by column, plus the parsed effective date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRow {
    values: IndexMap<String, String>,
    effective: NaiveDateTime,
}

impl MetadataRow {
    /// Build a row from column/value pairs; the date column must parse
    ///
    /// # Errors
    /// Returns [`EcmdError::InvalidDate`] if the effective date is missing or malformed.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, EcmdError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let values: IndexMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.as_ref().trim().to_string()))
            .collect();
        let effective = parse_ecmd_date(values.get(DATE_COLUMN).map_or("", String::as_str))?;
        Ok(Self { values, effective })
    }

    /// Cell value for `column`
    #[inline]
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    /// Cell value for `column`, treating blank cells as absent
    #[inline]
    #[must_use]
    pub fn get_non_empty(&self, column: &str) -> Option<&str> {
        self.get(column).filter(|v| !v.is_empty())
    }

    /// Site identifier
    #[inline]
    #[must_use]
    pub fn site_id(&self) -> &str {
        self.get(SITE_COLUMN).unwrap_or_default()
    }

    /// Parsed effective date
    #[inline]
    #[must_use]
    pub fn effective_date(&self) -> NaiveDateTime {
        self.effective
    }

    /// Columns in file order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Open an ECMD file with trimmed cells
pub(crate) fn open_reader(path: &Path) -> Result<csv::Reader<File>, EcmdError> {
    if !path.exists() {
        return Err(EcmdError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| EcmdError::io_error(path, e))?;
    Ok(csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(file))
}

/// Names in `wanted` that `headers` lacks, in `wanted` order
pub(crate) fn missing_columns(headers: &csv::StringRecord, wanted: &[&str]) -> Vec<String> {
    wanted
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .map(|col| (*col).to_string())
        .collect()
}

/// Column name to cell map for one record; short rows yield empty cells
pub(crate) fn record_map(
    headers: &csv::StringRecord,
    record: &csv::StringRecord,
) -> IndexMap<String, String> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.to_string(), record.get(i).unwrap_or_default().to_string()))
        .collect()
}

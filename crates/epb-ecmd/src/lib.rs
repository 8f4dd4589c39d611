//! ECMD site metadata
//!
//! The ECMD CSV is a historical log of a site's instrumentation. This crate:
//! - selects the row in force for a processing year ([`select_row_for_year`])
//! - renders every site row as an EddyPro dynamic metadata table
//!   ([`generate_dynamic_metadata`])
//! - validates the log's schema and numeric sanity

#![warn(unreachable_pub)]

pub mod dynamic;
pub mod error;
pub mod row;
pub mod selector;
pub mod validate;

pub use dynamic::{generate_dynamic_metadata, DYNAMIC_METADATA_COLUMNS};
pub use error::EcmdError;
pub use row::{
    parse_ecmd_date, MetadataRow, DATE_COLUMN, ECMD_DATE_FORMAT, REQUIRED_COLUMNS, SITE_COLUMN,
    TUBE_COLUMNS,
};
pub use selector::select_row_for_year;
pub use validate::{validate_ecmd_sanity, validate_ecmd_schema, SCHEMA_COLUMNS};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! EddyPro project template engine
//!
//! Loads the project template into a [`ConfigDocument`], applies per-scenario
//! patches and writes the result back in EddyPro's native layout:
//! - [`patch_parameters`]: processing-method values under their on-disk keys
//! - [`patch_paths`]: metadata, input and output locations
//! - [`patch_project_metadata`]: title, id and change timestamps
//! - [`patch_conditional_date_ranges`]: fitting windows for planar fit and
//!   time-lag optimization
//! - [`validate_inputs_preflight`] / [`validate_metadata_preflight`]: startup
//!   checks EddyPro would otherwise fail on
//! - [`populate_metadata_file`]: the static `.metadata` file from an ECMD row

#![warn(unreachable_pub)]

pub mod document;
pub mod error;
pub mod metadata;
pub mod patch;
pub mod preflight;

pub use document::{to_forward_slashes, ConfigDocument, Section};
pub use error::IniError;
pub use metadata::{
    populate_metadata_file, write_metadata_file, write_project_file_with_metadata,
    MetadataTarget, METADATA_HEADER, REQUIRED_METADATA_SECTIONS,
};
pub use patch::{
    patch_conditional_date_ranges, patch_parameters, patch_paths, patch_project_metadata,
    patch_project_metadata_at, PatchPathsRequest, PROJECT_DATE_FORMAT,
};
pub use preflight::{validate_inputs_preflight, validate_metadata_preflight, REQUIRED_VARIABLES};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for template patching
    pub use crate::{
        patch_conditional_date_ranges, patch_parameters, patch_paths, patch_project_metadata,
        ConfigDocument, IniError, MetadataTarget, PatchPathsRequest,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

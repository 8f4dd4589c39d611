//! EddyPro batch scenarios
//!
//! Parameter validation and scenario enumeration for batch runs:
//! - [`ParameterSpec`]: the static table of tunable processing methods
//! - [`validate_parameter`] / [`validate_parameters`]: value checks against that table
//! - [`generate_scenarios`]: capped, deterministic Cartesian product
//! - [`Scenario`]: one combination with its suffix and 1-based index
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use epb_scenario::{generate_scenarios, MAX_SCENARIOS};
//!
//! let mut options = BTreeMap::new();
//! options.insert("rot_meth".to_string(), vec![1, 3]);
//! options.insert("tlag_meth".to_string(), vec![2]);
//!
//! let scenarios = generate_scenarios(&options, MAX_SCENARIOS).unwrap();
//! assert_eq!(scenarios[0].suffix(), "_rot1_tlag2");
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod generator;
pub mod params;

pub use error::ScenarioError;
pub use generator::{
    format_scenario_summary, generate_scenarios, scenario_suffix, Scenario, MAX_SCENARIOS,
};
pub use params::{
    parameter_names, parameter_spec, parameter_specs, validate_parameter, validate_parameters,
    validate_scenario_parameters, ParameterSpec, PARAMETER_SPECS, ROT_METH_PLANAR_FIT,
    TLAG_METH_OPTIMIZATION,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for scenario handling
    pub use crate::{
        generate_scenarios, validate_parameter, validate_parameters, Scenario, ScenarioError,
        MAX_SCENARIOS,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

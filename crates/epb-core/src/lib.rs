//! EddyPro batch execution
//!
//! Ties the lower crates together into a batch run:
//! - Loads and validates the YAML [`BatchConfig`]
//! - Prepares one project file per scenario and year
//! - Runs `eddypro_rp` and `eddypro_fcc` under a performance monitor
//! - Records every outcome in a [`RunManifest`] and an HTML report
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use epb_core::{BatchConfig, BatchExecutor, TokioPipelineRunner, TracingSink};
//!
//! # async fn example() -> Result<(), epb_core::BatchError> {
//! let config = BatchConfig::load("config/config.yaml".as_ref())?;
//! config.validate()?;
//! let years = config.years_to_process.clone();
//! let batch = BatchExecutor::new(config, Arc::new(TokioPipelineRunner), Arc::new(TracingSink));
//! let outcome = batch.run(&years, &[]).await?;
//! epb_core::publish_run(batch.config(), &years, &outcome)?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod batch;
pub mod checksum;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod fs;
pub mod manifest;
pub mod pipeline;
pub mod report;
pub mod validation;

pub use batch::{BatchExecutor, BatchOutcome};
pub use checksum::{canonical_json, ConfigChecksum};
pub use config::{
    format_pattern, load_config_mapping, BatchConfig, ChartMode, DEFAULT_CONFIG_PATH, LOG_LEVELS,
};
pub use error::{BatchError, ExecutionError};
pub use events::{BatchEvent, EventLog, EventSink, TracingSink};
pub use executor::{
    prepare_project, ScenarioContext, ScenarioExecutor, ScenarioLayout, ScenarioResult,
};
pub use manifest::{run_id, Environment, RunManifest, MANIFEST_FILE_NAME};
pub use pipeline::{
    PipelineOutcome, PipelineRequest, PipelineRunner, TokioPipelineRunner, STAGE_FCC, STAGE_RP,
};
pub use report::{
    escape_html, publish_run, render_html_report, write_html_report, MetricSeries, PublishedRun,
    REPORT_FILE_NAME,
};
pub use validation::{validate_all, Category, ValidationOptions, ValidationReport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running a batch
    pub use crate::{
        BatchConfig, BatchError, BatchExecutor, BatchOutcome, EventSink, PipelineRunner,
        RunManifest, ScenarioResult, TokioPipelineRunner, TracingSink,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

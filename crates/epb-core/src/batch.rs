//! Batch execution over years and scenarios
//!
//! Scenarios of one year always run in order. With `multiprocessing` set,
//! distinct years run as concurrent tokio tasks bounded by a semaphore; each
//! year writes only under its own output directory.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use epb_scenario::Scenario;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::events::{BatchEvent, EventSink};
use crate::executor::{ScenarioContext, ScenarioExecutor, ScenarioResult};
use crate::pipeline::PipelineRunner;

/// Results of a batch run
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// Every scenario result, ordered by year then scenario index
    pub results: Vec<ScenarioResult>,
    /// Local start time
    pub start_time: NaiveDateTime,
    /// Local end time
    pub end_time: NaiveDateTime,
}

impl BatchOutcome {
    /// Number of successful scenarios
    #[must_use]
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Number of failed scenarios
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.successful()
    }

    /// Every scenario succeeded
    #[must_use]
    pub fn overall_success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

/// Runs every scenario of every requested year
pub struct BatchExecutor {
    config: Arc<BatchConfig>,
    executor: ScenarioExecutor,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("site_id", &self.config.site_id)
            .finish_non_exhaustive()
    }
}

impl BatchExecutor {
    /// Create a batch executor
    #[must_use]
    pub fn new(
        config: BatchConfig,
        runner: Arc<dyn PipelineRunner>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            executor: ScenarioExecutor::new(runner, Arc::clone(&events)),
            events,
        }
    }

    /// Configuration the batch runs with
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run `scenarios` for each of `years`
    ///
    /// An empty scenario list means one baseline run per year. Scenario
    /// failures are recorded in the results and do not stop the batch.
    ///
    /// # Errors
    /// Returns [`BatchError::Pipeline`] if a year task panics.
    pub async fn run(
        &self,
        years: &[i32],
        scenarios: &[Scenario],
    ) -> Result<BatchOutcome, BatchError> {
        let start_time = Local::now().naive_local();
        self.events.emit(BatchEvent::BatchStarted {
            site_id: self.config.site_id.clone(),
            years: years.to_vec(),
            scenarios_per_year: scenarios.len().max(1),
        });

        let mut results = if self.config.multiprocessing && years.len() > 1 {
            self.run_years_concurrently(years, scenarios).await?
        } else {
            let mut results = Vec::new();
            for &year in years {
                results.extend(self.run_year(year, scenarios).await);
            }
            results
        };
        results.sort_by_key(|r| (r.year, r.scenario_index));

        let outcome = BatchOutcome {
            results,
            start_time,
            end_time: Local::now().naive_local(),
        };
        self.events.emit(BatchEvent::BatchFinished {
            successful: outcome.successful(),
            failed: outcome.failed(),
        });
        Ok(outcome)
    }

    async fn run_year(&self, year: i32, scenarios: &[Scenario]) -> Vec<ScenarioResult> {
        run_year(&self.executor, &self.config, year, scenarios).await
    }

    async fn run_years_concurrently(
        &self,
        years: &[i32],
        scenarios: &[Scenario],
    ) -> Result<Vec<ScenarioResult>, BatchError> {
        let workers = self.config.max_processes.max(1);
        tracing::info!(
            "Processing {} years with up to {} concurrent workers",
            years.len(),
            workers
        );
        let semaphore = Arc::new(Semaphore::new(workers));
        let scenarios: Arc<[Scenario]> = scenarios.into();
        let mut tasks = JoinSet::new();

        for &year in years {
            let semaphore = Arc::clone(&semaphore);
            let executor = self.executor.clone();
            let config = Arc::clone(&self.config);
            let scenarios = Arc::clone(&scenarios);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                run_year(&executor, &config, year, &scenarios).await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let year_results =
                joined.map_err(|e| BatchError::Pipeline(format!("year task failed: {e}")))?;
            results.extend(year_results);
        }
        Ok(results)
    }
}

async fn run_year(
    executor: &ScenarioExecutor,
    config: &BatchConfig,
    year: i32,
    scenarios: &[Scenario],
) -> Vec<ScenarioResult> {
    tracing::info!("Processing year {} for site {}", year, config.site_id);
    let ctx = ScenarioContext::from_config(config, year);
    if scenarios.is_empty() {
        return vec![executor.execute(&ctx, None).await];
    }
    let mut results = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        results.push(executor.execute(&ctx, Some(scenario)).await);
    }
    results
}

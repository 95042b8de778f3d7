//! # NIMBY Radar
//!
//! Screens the UK Renewable Energy Planning Database (REPD) for cancelled projects,
//! asks a language model how much local opposition contributed to each outcome, and
//! has a second model pass judge how plausible those analyses are.
//!
//! ## Core Concepts
//!
//! - **Dataset**: a cleaned REPD extract, filtered down to cancelled projects
//! - **Analysis**: a structured [`AnalysisResult`] per project (NIMBY score, certainty, notes)
//! - **Evaluation**: an [`EvaluationVerdict`] label per analysis, mapped to a numeric accuracy
//! - **Run summary**: mean certainty and mean accuracy of a batch, appended to a JSONL log
//!
//! Model output is never trusted as-is: every response is checked against the expected
//! field types by [`validator::validate`] before it becomes a typed value.
//!
//! ## Example
//!
//! ```rust,ignore
//! use nimby_radar::*;
//! use nimby_radar::llm::anthropic::{self, AnthropicClient};
//!
//! let settings = Settings::from_env(anthropic::DEFAULT_MODEL)?;
//! let client = AnthropicClient::new(settings.provider.clone())?;
//! let pipeline = NimbyPipeline::new(client, &settings);
//!
//! let (outcome, summary) = pipeline.run().await?;
//! println!("{} analysed, mean certainty {:.1}", outcome.pairs.len(), summary.certainty);
//! ```

pub mod agent;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod llm;
pub mod schema;
pub mod stats;
pub mod validator;

pub use agent::{BatchOutcome, NimbyAgent, RecordFailure};
pub use config::{AgentConfig, DatasetConfig, FailurePolicy, ProviderConfig, Settings, TextEncoding};
pub use dataset::{select_cancelled, Dataset, RepdLoader};
pub use error::{NimbyError, Result, Stage};
pub use evaluation::{EvalLog, ScoreSheet};
pub use llm::client::{ModelCallError, ModelCallErrorKind, ModelClient, ModelResponse};
pub use schema::*;
pub use stats::{processing_stats, YearStats};
pub use validator::{validate, validate_as, ResponseSchema, StructuredOutput};

use log::{debug, info};

/// Load, filter, analyse and evaluate in one call.
pub struct NimbyPipeline<C> {
    loader: RepdLoader,
    agent: NimbyAgent<C>,
}

impl<C: ModelClient> NimbyPipeline<C> {
    pub fn new(client: C, settings: &Settings) -> Self {
        Self {
            loader: RepdLoader::from_config(&settings.dataset),
            agent: NimbyAgent::new(client, settings.agent.clone()),
        }
    }

    pub fn from_parts(loader: RepdLoader, agent: NimbyAgent<C>) -> Self {
        Self { loader, agent }
    }

    pub fn agent(&self) -> &NimbyAgent<C> {
        &self.agent
    }

    /// Runs the configured batch over the cancelled projects in the dataset.
    pub async fn run(&self) -> Result<(BatchOutcome, RunSummary)> {
        let dataset = self.loader.load()?;
        let cancelled = dataset.select_cancelled()?;
        info!(
            "Selected {} cancelled projects out of {}",
            cancelled.len(),
            dataset.len()
        );
        self.process(cancelled.records()).await
    }

    /// Analyses and evaluates an already filtered set of records.
    pub async fn process(&self, records: &[ProjectRecord]) -> Result<(BatchOutcome, RunSummary)> {
        let outcome = self.agent.run(records).await?;
        for failure in &outcome.failures {
            debug!(
                "Skipped #{} ({:?}) during {}: {}",
                failure.index, failure.ref_id, failure.stage, failure.error
            );
        }

        let summary = self.agent.aggregate_outcome(&outcome).await?;
        info!(
            "Run complete: {} evaluated, {} failed, mean certainty {:.1}",
            summary.evaluated, summary.failed_records, summary.certainty
        );
        Ok((outcome, summary))
    }
}

pub async fn run_pipeline<C: ModelClient>(
    client: C,
    settings: &Settings,
) -> Result<(BatchOutcome, RunSummary)> {
    NimbyPipeline::new(client, settings).run().await
}

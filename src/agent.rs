use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{AgentConfig, FailurePolicy};
use crate::error::{NimbyError, Result, Stage};
use crate::llm::client::{MessageOptions, ModelClient};
use crate::llm::prompts::build_analysis_prompt;
use crate::schema::{AnalysisResult, ProjectRecord};
use crate::validator::{validate_as, StructuredOutput};

/// A record the batch left out under [`FailurePolicy::SkipAndLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFailure {
    /// Position of the record within the batch.
    pub index: usize,
    pub stage: Stage,
    pub ref_id: Option<String>,
    pub error: String,
}

/// Analysed records of one batch, in input order, plus the ones that were skipped.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub pairs: Vec<(ProjectRecord, AnalysisResult)>,
    pub failures: Vec<RecordFailure>,
}

/// Drives the analysis and evaluation passes against a single model provider.
pub struct NimbyAgent<C> {
    client: C,
    config: AgentConfig,
}

impl<C: ModelClient> NimbyAgent<C> {
    pub fn new(client: C, config: AgentConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Analyses one free-form context. Errors propagate as-is.
    pub async fn run_singular<T>(&self, context: &T) -> Result<AnalysisResult>
    where
        T: Serialize + Sync + ?Sized,
    {
        let prompt = build_analysis_prompt(context)?;
        self.call_structured(&prompt, &self.config.analysis_options())
            .await
    }

    /// Analyses the first `config.max_records` records.
    pub async fn run(&self, records: &[ProjectRecord]) -> Result<BatchOutcome> {
        self.run_batch(records, self.config.max_records).await
    }

    /// Analyses the first `max_count` records in order, one model call at a time.
    pub async fn run_batch(
        &self,
        records: &[ProjectRecord],
        max_count: usize,
    ) -> Result<BatchOutcome> {
        let batch = &records[..max_count.min(records.len())];
        info!(
            "Analysing {} of {} records with {}",
            batch.len(),
            records.len(),
            self.client.name()
        );

        let options = self.config.analysis_options();
        let mut outcome = BatchOutcome::default();

        for (index, record) in batch.iter().enumerate() {
            debug!("Record #{} ({})", index, record.site_name);
            let analysed = match build_analysis_prompt(record) {
                Ok(prompt) => self.call_structured::<AnalysisResult>(&prompt, &options).await,
                Err(e) => Err(e),
            };

            match analysed {
                Ok(result) => outcome.pairs.push((record.clone(), result)),
                Err(err) => {
                    let failure = self.on_record_failure(Stage::Analysis, index, record, err)?;
                    outcome.failures.push(failure);
                }
            }
        }

        info!(
            "Batch complete: {} analysed, {} skipped",
            outcome.pairs.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }

    pub(crate) async fn call_structured<T: StructuredOutput>(
        &self,
        prompt: &str,
        options: &MessageOptions,
    ) -> Result<T> {
        let schema = T::response_schema();
        let response = self
            .client
            .call_structured(prompt, &schema, options)
            .await?;
        debug!(
            "{} response: {} input tokens, {} output tokens",
            schema.name, response.input_tokens, response.output_tokens
        );
        validate_as::<T>(&response.text)
    }

    /// Applies the failure policy: returns the failure to record, or the error that ends the batch.
    pub(crate) fn on_record_failure(
        &self,
        stage: Stage,
        index: usize,
        record: &ProjectRecord,
        err: NimbyError,
    ) -> Result<RecordFailure> {
        if self.config.failure_policy == FailurePolicy::Abort || !err.is_per_record() {
            return Err(NimbyError::RecordFailed {
                stage,
                index,
                source: Box::new(err),
            });
        }

        warn!(
            "Skipping record #{} ({}) after {} failure: {}",
            index, record.site_name, stage, err
        );
        Ok(RecordFailure {
            index,
            stage,
            ref_id: record.ref_id.clone(),
            error: err.to_string(),
        })
    }
}

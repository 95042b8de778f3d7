use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, info, warn};

use crate::agent::{BatchOutcome, NimbyAgent};
use crate::error::{NimbyError, Result, Stage};
use crate::llm::client::ModelClient;
use crate::llm::prompts::build_evaluation_prompt;
use crate::schema::{AccuracyTable, AnalysisResult, EvaluationVerdict, ProjectRecord, RunSummary};

/// Per-record inputs to a run summary.
#[derive(Debug, Clone, Default)]
pub struct ScoreSheet {
    pub certainties: Vec<i64>,
    pub accuracies: Vec<f64>,
    pub failed_records: usize,
}

impl ScoreSheet {
    /// Records one evaluated pair. Unrecognized labels keep the certainty but add no accuracy.
    pub fn record(&mut self, certainty: i64, label: Option<&str>, table: &AccuracyTable) {
        self.certainties.push(certainty);
        match label.map(|l| (l, table.score_label(l))) {
            Some((_, Some(score))) => self.accuracies.push(score),
            Some((l, None)) => debug!("Ignoring unrecognized accuracy label '{}'", l),
            None => {}
        }
    }

    /// Means of both lists. Fails on an empty sheet instead of producing NaN.
    pub fn summarize(&self) -> Result<RunSummary> {
        if self.certainties.is_empty() {
            return Err(NimbyError::EmptyBatch);
        }

        let certainty =
            self.certainties.iter().map(|&c| c as f64).sum::<f64>() / self.certainties.len() as f64;
        let accuracy = if self.accuracies.is_empty() {
            None
        } else {
            Some(self.accuracies.iter().sum::<f64>() / self.accuracies.len() as f64)
        };

        Ok(RunSummary {
            certainty,
            accuracy,
            evaluated: self.certainties.len(),
            accuracy_samples: self.accuracies.len(),
            failed_records: self.failed_records,
            timestamp: Local::now(),
        })
    }
}

impl<C: ModelClient> NimbyAgent<C> {
    /// Asks the model to judge each analysis and averages certainty and accuracy.
    pub async fn evaluate(&self, pairs: &[(ProjectRecord, AnalysisResult)]) -> Result<RunSummary> {
        self.score(pairs).await?.summarize()
    }

    /// [`evaluate`](Self::evaluate), then append the summary to the configured run log.
    pub async fn aggregate(&self, pairs: &[(ProjectRecord, AnalysisResult)]) -> Result<RunSummary> {
        let summary = self.evaluate(pairs).await?;
        EvalLog::new(&self.config().eval_log_path).append(&summary)?;
        Ok(summary)
    }

    /// Like [`aggregate`](Self::aggregate), also counting the records the analysis pass skipped.
    ///
    /// A batch with no analysed pairs but some skipped records fails with
    /// [`NimbyError::BatchFailed`], which carries every skipped record.
    pub async fn aggregate_outcome(&self, outcome: &BatchOutcome) -> Result<RunSummary> {
        if let (true, Some(first)) = (outcome.pairs.is_empty(), outcome.failures.first()) {
            return Err(NimbyError::BatchFailed {
                stage: first.stage,
                index: first.index,
                message: first.error.clone(),
                failures: outcome.failures.clone(),
            });
        }

        let mut sheet = self.score(&outcome.pairs).await?;
        sheet.failed_records += outcome.failures.len();
        let summary = sheet.summarize()?;
        EvalLog::new(&self.config().eval_log_path).append(&summary)?;
        Ok(summary)
    }

    async fn score(&self, pairs: &[(ProjectRecord, AnalysisResult)]) -> Result<ScoreSheet> {
        if pairs.is_empty() {
            return Err(NimbyError::EmptyBatch);
        }

        let options = self.config().evaluation_options();
        let table = &self.config().accuracy_table;
        let mut sheet = ScoreSheet::default();

        for (index, (record, analysis)) in pairs.iter().enumerate() {
            let verdict = match build_evaluation_prompt(record, analysis) {
                Ok(prompt) => {
                    self.call_structured::<EvaluationVerdict>(&prompt, &options).await
                }
                Err(e) => Err(e),
            };

            match verdict {
                Ok(verdict) => {
                    debug!(
                        "Record #{} judged '{}': {}",
                        index, verdict.accuracy, verdict.reasoning
                    );
                    sheet.record(analysis.certainty, Some(verdict.accuracy.as_str()), table);
                }
                Err(err) => {
                    self.on_record_failure(Stage::Evaluation, index, record, err)?;
                    sheet.record(analysis.certainty, None, table);
                    sheet.failed_records += 1;
                }
            }
        }

        Ok(sheet)
    }
}

/// Append-only, line-delimited JSON log of run summaries.
#[derive(Debug, Clone)]
pub struct EvalLog {
    path: PathBuf,
}

impl EvalLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `summary` as one line at the end of the file, creating it if needed.
    pub fn append(&self, summary: &RunSummary) -> Result<()> {
        let line = serde_json::to_string(summary)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;

        match summary.accuracy {
            Some(accuracy) => info!(
                "Logged run summary to {}: certainty {:.1}, accuracy {:.1}",
                self.path.display(),
                summary.certainty,
                accuracy
            ),
            None => warn!(
                "Logged run summary to {}: certainty {:.1}, no recognized accuracy labels",
                self.path.display(),
                summary.certainty
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(entries: &[(i64, &str)]) -> ScoreSheet {
        let table = AccuracyTable::default();
        let mut sheet = ScoreSheet::default();
        for (certainty, label) in entries {
            sheet.record(*certainty, Some(*label), &table);
        }
        sheet
    }

    #[test]
    fn test_means_over_recognized_labels() {
        let summary = sheet(&[(90, "high"), (70, "certain")]).summarize().unwrap();
        assert_eq!(summary.certainty, 80.0);
        assert_eq!(summary.accuracy, Some(90.0));
        assert_eq!(summary.evaluated, 2);
        assert_eq!(summary.accuracy_samples, 2);
    }

    #[test]
    fn test_unknown_label_keeps_certainty() {
        let summary = sheet(&[(90, "unknown"), (40, "low")]).summarize().unwrap();
        assert_eq!(summary.certainty, 65.0);
        assert_eq!(summary.accuracy, Some(0.0));
        assert_eq!(summary.accuracy_samples, 1);
    }

    #[test]
    fn test_no_recognized_labels() {
        let summary = sheet(&[(50, "HIGH"), (50, "sure")]).summarize().unwrap();
        assert_eq!(summary.certainty, 50.0);
        assert_eq!(summary.accuracy, None);
    }

    #[test]
    fn test_empty_sheet_is_an_error() {
        let err = ScoreSheet::default().summarize().unwrap_err();
        assert!(matches!(err, NimbyError::EmptyBatch));
    }

    #[test]
    fn test_custom_table() {
        let table = AccuracyTable {
            certain: 1.0,
            high: 0.75,
            medium: 0.5,
            low: 0.25,
        };
        let mut sheet = ScoreSheet::default();
        sheet.record(10, Some("medium"), &table);
        sheet.record(20, Some("high"), &table);
        assert_eq!(sheet.summarize().unwrap().accuracy, Some(0.625));
    }

    #[test]
    fn test_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = EvalLog::new(dir.path().join("eval_log.json"));
        std::fs::write(log.path(), "{\"existing\":true}\n").unwrap();

        let first = sheet(&[(90, "high")]).summarize().unwrap();
        let second = sheet(&[(10, "low")]).summarize().unwrap();
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "{\"existing\":true}");

        let parsed: RunSummary = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(parsed.certainty, 10.0);
        let raw: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert!(raw["timestamp"].is_string());
    }
}

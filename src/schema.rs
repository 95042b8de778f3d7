use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Development status as published in the REPD `Development Status (short)` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatusCategory {
    ApplicationRefused,
    Abandoned,
    ApplicationWithdrawn,
    AppealRefused,
    AppealWithdrawn,
    PlanningPermissionExpired,
    Revised,
    Decommissioned,
    AppealLodged,
    UnderConstruction,
    AwaitingConstruction,
    Operational,
    ApplicationSubmitted,
    NoApplicationRequired,
    /// A value outside the published vocabulary, kept verbatim.
    Unrecognized(String),
}

impl StatusCategory {
    pub const KNOWN: [StatusCategory; 14] = [
        StatusCategory::ApplicationRefused,
        StatusCategory::Abandoned,
        StatusCategory::ApplicationWithdrawn,
        StatusCategory::AppealRefused,
        StatusCategory::AppealWithdrawn,
        StatusCategory::PlanningPermissionExpired,
        StatusCategory::Revised,
        StatusCategory::Decommissioned,
        StatusCategory::AppealLodged,
        StatusCategory::UnderConstruction,
        StatusCategory::AwaitingConstruction,
        StatusCategory::Operational,
        StatusCategory::ApplicationSubmitted,
        StatusCategory::NoApplicationRequired,
    ];

    /// The fixed set of statuses counted as "cancelled". Closed: nothing is inferred.
    pub const CANCELLED: [StatusCategory; 6] = [
        StatusCategory::ApplicationRefused,
        StatusCategory::Abandoned,
        StatusCategory::ApplicationWithdrawn,
        StatusCategory::AppealRefused,
        StatusCategory::AppealWithdrawn,
        StatusCategory::PlanningPermissionExpired,
    ];

    pub const IN_PROGRESS: [StatusCategory; 5] = [
        StatusCategory::ApplicationSubmitted,
        StatusCategory::Revised,
        StatusCategory::AwaitingConstruction,
        StatusCategory::NoApplicationRequired,
        StatusCategory::UnderConstruction,
    ];

    pub fn label(&self) -> &str {
        match self {
            StatusCategory::ApplicationRefused => "Application Refused",
            StatusCategory::Abandoned => "Abandoned",
            StatusCategory::ApplicationWithdrawn => "Application Withdrawn",
            StatusCategory::AppealRefused => "Appeal Refused",
            StatusCategory::AppealWithdrawn => "Appeal Withdrawn",
            StatusCategory::PlanningPermissionExpired => "Planning Permission Expired",
            StatusCategory::Revised => "Revised",
            StatusCategory::Decommissioned => "Decommissioned",
            StatusCategory::AppealLodged => "Appeal Lodged",
            StatusCategory::UnderConstruction => "Under Construction",
            StatusCategory::AwaitingConstruction => "Awaiting Construction",
            StatusCategory::Operational => "Operational",
            StatusCategory::ApplicationSubmitted => "Application Submitted",
            StatusCategory::NoApplicationRequired => "No Application Required",
            StatusCategory::Unrecognized(raw) => raw.as_str(),
        }
    }

    /// Normalizes a raw cell: surrounding whitespace is ignored and matching is case-insensitive.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        Self::KNOWN
            .iter()
            .find(|known| known.label().eq_ignore_ascii_case(trimmed))
            .cloned()
            .unwrap_or_else(|| StatusCategory::Unrecognized(trimmed.to_string()))
    }

    pub fn is_cancelled(&self) -> bool {
        Self::CANCELLED.contains(self)
    }

    pub fn is_in_progress(&self) -> bool {
        Self::IN_PROGRESS.contains(self)
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for StatusCategory {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for StatusCategory {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(StatusCategory::parse(&raw))
    }
}

/// One cleaned REPD row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub ref_id: Option<String>,
    pub site_name: String,
    pub technology_type: String,
    pub country: Option<String>,
    pub county: Option<String>,
    pub planning_authority: Option<String>,
    /// Installed capacity in MWelec; missing or non-numeric cells clean to 0.0.
    pub capacity_mw: f64,
    pub status: StatusCategory,
    pub planning_application_submitted: Option<NaiveDate>,
    pub planning_permission_refused: Option<NaiveDate>,
    pub planning_application_withdrawn: Option<NaiveDate>,
    pub appeal_refused: Option<NaiveDate>,
    pub record_last_updated: Option<NaiveDate>,
    /// Every non-empty column without a typed field, keyed by its header.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Structured NIMBY assessment returned by the analysis pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    #[schemars(
        description = "Short, pokedex style summary of the project and the opposition it met."
    )]
    pub header: String,

    #[schemars(description = "How strongly local opposition drove the outcome.")]
    pub nimby_score: i64,

    #[schemars(
        description = "Confidence in this analysis from 0 (guessing) to 100 (certain)."
    )]
    pub certainty: i64,

    #[schemars(description = "Explanation of the certainty value and what information is missing.")]
    pub certainty_meta: String,

    #[schemars(description = "Short notable facts about the project or its opposition.")]
    pub interesting_information: Vec<String>,
}

/// Plausibility judgment returned by the evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EvaluationVerdict {
    #[schemars(description = "One of: certain, high, medium, low.")]
    pub accuracy: String,

    #[schemars(description = "A single concise sentence justifying the accuracy label.")]
    pub reasoning: String,
}

/// Ordered accuracy levels an evaluator may assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccuracyLevel {
    Low,
    Medium,
    High,
    Certain,
}

impl AccuracyLevel {
    /// Exact match on the lowercase label; anything else is unrecognized.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "certain" => Some(AccuracyLevel::Certain),
            "high" => Some(AccuracyLevel::High),
            "medium" => Some(AccuracyLevel::Medium),
            "low" => Some(AccuracyLevel::Low),
            _ => None,
        }
    }
}

/// Numeric score assigned to each accuracy level during aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyTable {
    pub certain: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for AccuracyTable {
    fn default() -> Self {
        Self {
            certain: 100.0,
            high: 80.0,
            medium: 40.0,
            low: 0.0,
        }
    }
}

impl AccuracyTable {
    pub fn score(&self, level: AccuracyLevel) -> f64 {
        match level {
            AccuracyLevel::Certain => self.certain,
            AccuracyLevel::High => self.high,
            AccuracyLevel::Medium => self.medium,
            AccuracyLevel::Low => self.low,
        }
    }

    pub fn score_label(&self, label: &str) -> Option<f64> {
        AccuracyLevel::from_label(label).map(|level| self.score(level))
    }
}

/// One aggregate entry per evaluated batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub certainty: f64,
    /// `None` when no evaluator label was recognized.
    pub accuracy: Option<f64>,
    pub evaluated: usize,
    pub accuracy_samples: usize,
    pub failed_records: usize,
    pub timestamp: DateTime<Local>,
}

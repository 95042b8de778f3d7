use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, REFUSED_COLUMN, SUBMITTED_COLUMN};
use crate::error::Result;

const BUCKET_WIDTH_DAYS: i64 = 90;
const BUCKET_COUNT: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayBucket {
    pub range: String,
    pub count: usize,
}

/// Time-to-refusal figures for applications submitted in one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearStats {
    pub year: i32,
    /// Mean days from submission to refusal, rounded to one decimal place.
    pub avg_delay: f64,
    pub distribution: Vec<DelayBucket>,
}

/// Groups refused applications by submission year and buckets their decision delays.
///
/// Only records with both a submitted and a refused date contribute.
pub fn processing_stats(dataset: &Dataset) -> Result<Vec<YearStats>> {
    dataset.require_column(SUBMITTED_COLUMN)?;
    dataset.require_column(REFUSED_COLUMN)?;

    let mut by_year: BTreeMap<i32, Vec<i64>> = BTreeMap::new();
    for record in dataset.records() {
        if let (Some(submitted), Some(refused)) = (
            record.planning_application_submitted,
            record.planning_permission_refused,
        ) {
            let days = (refused - submitted).num_days();
            by_year.entry(submitted.year()).or_default().push(days);
        }
    }

    Ok(by_year
        .into_iter()
        .map(|(year, days)| YearStats {
            year,
            avg_delay: round_one(days.iter().sum::<i64>() as f64 / days.len() as f64),
            distribution: distribution(&days),
        })
        .collect())
}

fn distribution(days: &[i64]) -> Vec<DelayBucket> {
    let mut buckets: Vec<DelayBucket> = (0..BUCKET_COUNT)
        .map(|i| {
            let lo = i * BUCKET_WIDTH_DAYS;
            let hi = lo + BUCKET_WIDTH_DAYS;
            DelayBucket {
                range: format!("{}-{} days", lo, hi),
                count: days.iter().filter(|&&d| d >= lo && d < hi).count(),
            }
        })
        .collect();

    let ceiling = BUCKET_COUNT * BUCKET_WIDTH_DAYS;
    buckets.push(DelayBucket {
        range: format!("Over {} days", ceiling),
        count: days.iter().filter(|&&d| d >= ceiling).count(),
    });
    buckets
}

fn round_one(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

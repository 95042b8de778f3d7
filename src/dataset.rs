//! Loading, cleaning and filtering of REPD extracts.
//!
//! Every filter returns a new [`Dataset`] holding clones of the matching records in
//! source order; the input is never touched. Filters check that the column they
//! depend on exists, so running one against the wrong file fails loudly instead of
//! silently selecting nothing.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{debug, info, warn};

use crate::config::{DatasetConfig, TextEncoding};
use crate::error::{NimbyError, Result};
use crate::schema::{ProjectRecord, StatusCategory};

pub const REF_ID_COLUMN: &str = "Ref ID";
pub const SITE_NAME_COLUMN: &str = "Site Name";
pub const TECHNOLOGY_COLUMN: &str = "Technology Type";
pub const CAPACITY_COLUMN: &str = "Installed Capacity (MWelec)";
pub const STATUS_COLUMN: &str = "Development Status (short)";
pub const COUNTRY_COLUMN: &str = "Country";
pub const COUNTY_COLUMN: &str = "County";
pub const AUTHORITY_COLUMN: &str = "Planning Authority";
pub const SUBMITTED_COLUMN: &str = "Planning Application Submitted";
pub const REFUSED_COLUMN: &str = "Planning Permission Refused";
pub const WITHDRAWN_COLUMN: &str = "Planning Application Withdrawn";
pub const APPEAL_REFUSED_COLUMN: &str = "Appeal Refused";
pub const LAST_UPDATED_COLUMN: &str = "Record Last Updated (dd/mm/yyyy)";

const TYPED_COLUMNS: [&str; 13] = [
    REF_ID_COLUMN,
    SITE_NAME_COLUMN,
    TECHNOLOGY_COLUMN,
    CAPACITY_COLUMN,
    STATUS_COLUMN,
    COUNTRY_COLUMN,
    COUNTY_COLUMN,
    AUTHORITY_COLUMN,
    SUBMITTED_COLUMN,
    REFUSED_COLUMN,
    WITHDRAWN_COLUMN,
    APPEAL_REFUSED_COLUMN,
    LAST_UPDATED_COLUMN,
];

const REPD_DATE_FORMAT: &str = "%d/%m/%Y";

/// An ordered, cleaned set of REPD records plus the header row they came from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<String>,
    records: Vec<ProjectRecord>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, records: Vec<ProjectRecord>) -> Self {
        Self { columns, records }
    }

    /// Parses CSV text with a header row. Cells are trimmed; rows may be ragged.
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut records = Vec::new();
        for (row_idx, row) in reader.records().enumerate() {
            let row = row?;
            let cells: BTreeMap<&str, &str> = columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .filter(|(_, v)| !v.is_empty())
                .collect();
            let record = clean_row(&cells);
            if let StatusCategory::Unrecognized(raw) = &record.status {
                if !raw.is_empty() {
                    warn!("Row {} has unrecognized development status '{}'", row_idx + 1, raw);
                }
            }
            records.push(record);
        }

        debug!(
            "Parsed {} records across {} columns",
            records.len(),
            columns.len()
        );
        Ok(Self { columns, records })
    }

    pub fn from_csv_bytes(bytes: &[u8], encoding: TextEncoding) -> Result<Self> {
        let text = decode(bytes, encoding)?;
        Self::from_csv_str(&text)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[ProjectRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ProjectRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn require_column(&self, column: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(NimbyError::DataFormat(format!(
                "required column '{}' is missing",
                column
            )))
        }
    }

    /// Records whose status is in the fixed cancelled set.
    pub fn select_cancelled(&self) -> Result<Dataset> {
        self.retain(STATUS_COLUMN, |r| r.status.is_cancelled())
    }

    /// Records still working through planning or construction.
    pub fn select_in_progress(&self) -> Result<Dataset> {
        self.retain(STATUS_COLUMN, |r| r.status.is_in_progress())
    }

    pub fn filter_by_status(&self, statuses: &[StatusCategory]) -> Result<Dataset> {
        self.retain(STATUS_COLUMN, |r| statuses.contains(&r.status))
    }

    pub fn filter_by_county(&self, county: &str) -> Result<Dataset> {
        self.retain(COUNTY_COLUMN, |r| r.county.as_deref() == Some(county))
    }

    pub fn filter_by_authority(&self, authorities: &[&str]) -> Result<Dataset> {
        let wanted: HashSet<&str> = authorities.iter().copied().collect();
        self.retain(AUTHORITY_COLUMN, |r| {
            r.planning_authority
                .as_deref()
                .is_some_and(|a| wanted.contains(a))
        })
    }

    /// Records submitted on or after `after`. Records without a parseable date are dropped.
    pub fn filter_submitted_after(&self, after: NaiveDate) -> Result<Dataset> {
        self.retain(SUBMITTED_COLUMN, |r| {
            r.planning_application_submitted
                .is_some_and(|submitted| submitted >= after)
        })
    }

    fn retain<P>(&self, column: &str, predicate: P) -> Result<Dataset>
    where
        P: Fn(&ProjectRecord) -> bool,
    {
        self.require_column(column)?;
        Ok(Dataset {
            columns: self.columns.clone(),
            records: self
                .records
                .iter()
                .filter(|r| predicate(r))
                .cloned()
                .collect(),
        })
    }
}

/// The ordered subsequence of `dataset` whose status is cancelled.
pub fn select_cancelled(dataset: &Dataset) -> Result<Vec<ProjectRecord>> {
    Ok(dataset.select_cancelled()?.into_records())
}

/// Reads REPD CSV files from disk.
#[derive(Debug, Clone)]
pub struct RepdLoader {
    path: PathBuf,
    encoding: TextEncoding,
}

impl RepdLoader {
    pub fn new(path: impl Into<PathBuf>, encoding: TextEncoding) -> Self {
        Self {
            path: path.into(),
            encoding,
        }
    }

    pub fn from_config(config: &DatasetConfig) -> Self {
        Self::new(config.path.clone(), config.encoding)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Dataset> {
        let bytes = fs::read(&self.path)?;
        let dataset = Dataset::from_csv_bytes(&bytes, self.encoding)?;
        info!(
            "Loaded {} REPD records from {}",
            dataset.len(),
            self.path.display()
        );
        Ok(dataset)
    }
}

fn clean_row(cells: &BTreeMap<&str, &str>) -> ProjectRecord {
    let text = |column: &str| cells.get(column).map(|v| v.to_string());
    let date = |column: &str| {
        cells
            .get(column)
            .and_then(|v| NaiveDate::parse_from_str(v, REPD_DATE_FORMAT).ok())
    };

    let extra = cells
        .iter()
        .filter(|(k, _)| !TYPED_COLUMNS.contains(*k))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    ProjectRecord {
        ref_id: text(REF_ID_COLUMN),
        site_name: text(SITE_NAME_COLUMN).unwrap_or_default(),
        technology_type: text(TECHNOLOGY_COLUMN).unwrap_or_default(),
        country: text(COUNTRY_COLUMN),
        county: text(COUNTY_COLUMN),
        planning_authority: text(AUTHORITY_COLUMN),
        capacity_mw: cells
            .get(CAPACITY_COLUMN)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(0.0),
        status: StatusCategory::parse(cells.get(STATUS_COLUMN).copied().unwrap_or_default()),
        planning_application_submitted: date(SUBMITTED_COLUMN),
        planning_permission_refused: date(REFUSED_COLUMN),
        planning_application_withdrawn: date(WITHDRAWN_COLUMN),
        appeal_refused: date(APPEAL_REFUSED_COLUMN),
        record_last_updated: date(LAST_UPDATED_COLUMN),
        extra,
    }
}

fn decode(bytes: &[u8], encoding: TextEncoding) -> Result<String> {
    match encoding {
        TextEncoding::Utf8 => {
            let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            String::from_utf8(bytes.to_vec())
                .map_err(|e| NimbyError::DataFormat(format!("file is not valid UTF-8: {}", e)))
        }
        TextEncoding::Windows1252 => Ok(bytes.iter().map(|&b| windows_1252_char(b)).collect()),
    }
}

// 0x80..=0x9F differ from Latin-1; the five unassigned bytes pass through as C1 controls.
const WINDOWS_1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

fn windows_1252_char(byte: u8) -> char {
    match byte {
        0x80..=0x9F => WINDOWS_1252_HIGH[(byte - 0x80) as usize],
        _ => char::from(byte),
    }
}

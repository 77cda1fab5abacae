//! Record loading and per-record feature derivation using Polars

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::error::IngestionError;

/// Day-month-year format used by the `date` column
pub const DATE_FORMAT: &str = "%d-%m-%Y";

const TEXT_COLUMNS: [&str; 4] = ["date", "state", "district", "pincode"];
const COUNT_COLUMNS: [&str; 3] = ["age_0_5", "age_5_17", "age_18_greater"];

/// One cleaned enrolment event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub state: String,
    pub district: String,
    /// Postal code kept as an opaque label
    pub pincode: String,
    /// `None` when the source text did not parse as a day-month-year date
    pub date: Option<NaiveDate>,
    pub age_0_5: u64,
    pub age_5_17: u64,
    pub age_18_greater: u64,
}

/// A record with its derived features attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRecord {
    pub record: Record,
    pub total_activity: u64,
    /// `YYYY-MM`, absent when the date is absent
    pub month: Option<String>,
}

/// A source that was skipped during loading
#[derive(Debug, Clone)]
pub struct SkippedSource {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of the loading stage
#[derive(Debug)]
pub struct LoadReport {
    pub records: Vec<Record>,
    pub loaded: Vec<PathBuf>,
    pub skipped: Vec<SkippedSource>,
    /// Rows in the union before duplicate removal
    pub rows_read: usize,
    /// Rows dropped because a region key or count was missing or negative
    pub rows_rejected: usize,
}

/// Resolve an input path, trying `fallback_dir` when it does not exist as given
pub fn resolve_source(path: &Path, fallback_dir: Option<&Path>) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }

    let name = path.file_name()?;
    fallback_dir
        .map(|dir| dir.join(name))
        .filter(|candidate| candidate.is_file())
}

/// Load every source, union them in load order and drop exact duplicate rows
///
/// # Arguments
/// * `paths` - Input CSV files
/// * `fallback_dir` - Directory searched when a path does not exist
///
/// # Returns
/// * `LoadReport` with the cleaned records, or `IngestionError::NoSourcesLoaded`
///   if not a single source could be read
pub fn load_records(paths: &[PathBuf], fallback_dir: Option<&Path>) -> crate::Result<LoadReport> {
    let mut frames = Vec::with_capacity(paths.len());
    let mut loaded = Vec::new();
    let mut skipped = Vec::new();

    for path in paths {
        match read_source(path, fallback_dir) {
            Ok((resolved, frame)) => {
                info!(path = %resolved.display(), rows = frame.height(), "loaded source");
                loaded.push(resolved);
                frames.push(frame);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping source");
                skipped.push(SkippedSource {
                    path: path.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    if frames.is_empty() {
        return Err(IngestionError::NoSourcesLoaded {
            attempted: paths.len(),
        }
        .into());
    }

    let union = union_frames(frames)?;
    let rows_read = union.height();
    let deduped = drop_duplicate_rows(union)?;
    debug!(
        rows_read,
        rows_unique = deduped.height(),
        "removed duplicate rows"
    );

    let (records, rows_rejected) = frame_to_records(&deduped)?;
    if rows_rejected > 0 {
        warn!(rows_rejected, "dropped rows with missing keys or invalid counts");
    }

    Ok(LoadReport {
        records,
        loaded,
        skipped,
        rows_read,
        rows_rejected,
    })
}

/// Read one CSV source into the canonical seven-column layout
fn read_source(path: &Path, fallback_dir: Option<&Path>) -> crate::Result<(PathBuf, DataFrame)> {
    let resolved = resolve_source(path, fallback_dir).ok_or_else(|| IngestionError::SourceNotFound {
        path: path.to_path_buf(),
    })?;

    let raw = LazyCsvReader::new(&resolved)
        .with_has_header(true)
        .finish()?
        .collect()?;

    let frame = canonical_frame(&resolved, &raw)?;
    Ok((resolved, frame))
}

/// Select the required columns with fixed types so sources can be stacked
fn canonical_frame(path: &Path, raw: &DataFrame) -> crate::Result<DataFrame> {
    let mut columns = Vec::with_capacity(TEXT_COLUMNS.len() + COUNT_COLUMNS.len());

    let wanted = TEXT_COLUMNS
        .iter()
        .map(|name| (*name, DataType::String))
        .chain(COUNT_COLUMNS.iter().map(|name| (*name, DataType::Int64)));

    for (name, dtype) in wanted {
        let series = raw
            .column(name)
            .map_err(|_| IngestionError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })?;
        columns.push(series.cast(&dtype)?);
    }

    Ok(DataFrame::new(columns)?)
}

fn union_frames(frames: Vec<DataFrame>) -> crate::Result<DataFrame> {
    let lazy_frames: Vec<LazyFrame> = frames.into_iter().map(IntoLazy::lazy).collect();
    Ok(concat(lazy_frames, UnionArgs::default())?.collect()?)
}

/// Remove rows identical in every column to an earlier row, keeping input order
pub fn drop_duplicate_rows(df: DataFrame) -> crate::Result<DataFrame> {
    Ok(df
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?)
}

/// Convert the canonical frame into typed records.
///
/// Returns the records plus the number of rejected rows.
fn frame_to_records(df: &DataFrame) -> crate::Result<(Vec<Record>, usize)> {
    let dates = df.column("date")?.str()?;
    let states = df.column("state")?.str()?;
    let districts = df.column("district")?.str()?;
    let pincodes = df.column("pincode")?.str()?;
    let age_0_5 = df.column("age_0_5")?.i64()?;
    let age_5_17 = df.column("age_5_17")?.i64()?;
    let age_18_greater = df.column("age_18_greater")?.i64()?;

    let mut records = Vec::with_capacity(df.height());
    let mut rejected = 0;

    for idx in 0..df.height() {
        let keys = (states.get(idx), districts.get(idx), pincodes.get(idx));
        let counts = (
            non_negative(age_0_5.get(idx)),
            non_negative(age_5_17.get(idx)),
            non_negative(age_18_greater.get(idx)),
        );

        match (keys, counts) {
            ((Some(state), Some(district), Some(pincode)), (Some(a), Some(b), Some(c))) => {
                records.push(Record {
                    state: state.trim().to_string(),
                    district: district.trim().to_string(),
                    pincode: pincode.trim().to_string(),
                    date: dates.get(idx).and_then(parse_date),
                    age_0_5: a,
                    age_5_17: b,
                    age_18_greater: c,
                });
            }
            _ => rejected += 1,
        }
    }

    Ok((records, rejected))
}

fn non_negative(value: Option<i64>) -> Option<u64> {
    value.and_then(|v| u64::try_from(v).ok())
}

/// Parse a day-month-year date; anything else becomes `None`
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

impl Record {
    pub fn total_activity(&self) -> u64 {
        self.age_0_5 + self.age_5_17 + self.age_18_greater
    }

    pub fn month(&self) -> Option<String> {
        self.date.map(|d| d.format("%Y-%m").to_string())
    }
}

/// Attach `total_activity` and `month` to every record
pub fn derive_features(records: Vec<Record>) -> Vec<EnrichedRecord> {
    records
        .into_iter()
        .map(|record| EnrichedRecord {
            total_activity: record.total_activity(),
            month: record.month(),
            record,
        })
        .collect()
}

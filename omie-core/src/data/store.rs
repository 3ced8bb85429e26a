//! Parquet price store.
//!
//! Layout: `{processed_dir}/{name}.parquet` with a `{name}.meta.json` sidecar
//! and an optional `{name}.csv` mirror.
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - Dedup-on-merge keyed by (timestamp, zone, delivery day), ordered by timestamp
//! - No write at all when a merge leaves the rows unchanged
//! - Schema validation on load
//! - Metadata sidecar (row count, time range, zones, content hash)

use super::canonicalize::{Canonicalizer, MergePolicy};
use super::provider::DataError;
use super::record::{PriceRecord, Zone};
use super::schema::{PriceSchema, SchemaError};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

const CSV_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Metadata sidecar for a store file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub rows: usize,
    pub first_timestamp: Option<NaiveDateTime>,
    pub last_timestamp: Option<NaiveDateTime>,
    pub zones: Vec<Zone>,
    pub data_hash: String,
    pub updated_at: NaiveDateTime,
}

/// Outcome of merging a batch of records into a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub before: usize,
    pub incoming: usize,
    pub after: usize,
    /// Rows with a key the store did not have.
    pub added: usize,
    /// Whether the store file was rewritten.
    pub written: bool,
}

/// Store status as reported to the publisher.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub meta: Option<StoreMeta>,
}

/// One accumulating Parquet file of price records.
pub struct PriceStore {
    path: PathBuf,
    write_csv: bool,
}

impl PriceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_csv: false,
        }
    }

    /// Also mirror every write to a CSV file next to the Parquet file.
    pub fn with_csv(mut self, write_csv: bool) -> Self {
        self.write_csv = write_csv;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta_path(&self) -> PathBuf {
        self.path.with_extension("meta.json")
    }

    pub fn csv_path(&self) -> PathBuf {
        self.path.with_extension("csv")
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the store as a frame. A store that does not exist yet is an empty frame.
    pub fn load_frame(&self) -> Result<DataFrame, DataError> {
        if !self.exists() {
            return records_to_dataframe(&[]);
        }

        let file = fs::File::open(&self.path)
            .map_err(|e| DataError::ParquetError(format!("open {}: {e}", self.path.display())))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| DataError::ParquetError(format!("read {}: {e}", self.path.display())))?;

        let invalid = |e: SchemaError| DataError::ValidationError(format!("{}: {e}", self.path.display()));
        let df = PriceSchema::coerce(df).map_err(invalid)?;
        PriceSchema::validate(&df).map_err(invalid)?;

        // Drop anything else the writer left behind, e.g. a pandas index column
        df.select(PriceSchema::COLUMNS)
            .map_err(|e| DataError::ParquetError(format!("select store columns: {e}")))
    }

    /// Load all records, ordered as stored.
    pub fn load(&self) -> Result<Vec<PriceRecord>, DataError> {
        dataframe_to_records(&self.load_frame()?)
    }

    /// Merge records into the store and persist the result if anything changed.
    pub fn merge(&self, incoming: &[PriceRecord], policy: MergePolicy) -> Result<MergeStats, DataError> {
        let existing_df = self.load_frame()?;
        let existing = dataframe_to_records(&existing_df)?;
        let incoming_df = records_to_dataframe(incoming)?;

        let merged_df = Canonicalizer::merge(existing_df, incoming_df, policy)
            .map_err(|e| DataError::StoreError(format!("merge: {e}")))?;
        let merged = dataframe_to_records(&merged_df)?;

        let stats = MergeStats {
            before: existing.len(),
            incoming: incoming.len(),
            after: merged.len(),
            added: merged.len().saturating_sub(existing.len()),
            written: merged != existing,
        };

        if stats.written {
            self.write(&merged)?;
        }

        Ok(stats)
    }

    /// Replace every record delivered on or after `since` with `incoming`.
    ///
    /// Records before `since` are kept as they are.
    pub fn replace_since(&self, since: NaiveDate, incoming: &[PriceRecord]) -> Result<MergeStats, DataError> {
        let existing = self.load()?;
        let kept: Vec<PriceRecord> = existing
            .iter()
            .filter(|r| r.delivery_date().is_some_and(|d| d < since))
            .cloned()
            .collect();
        let kept_len = kept.len();

        let merged_df = Canonicalizer::merge(
            records_to_dataframe(&kept)?,
            records_to_dataframe(incoming)?,
            MergePolicy::KeepExisting,
        )
        .map_err(|e| DataError::StoreError(format!("merge: {e}")))?;
        let merged = dataframe_to_records(&merged_df)?;

        let stats = MergeStats {
            before: existing.len(),
            incoming: incoming.len(),
            after: merged.len(),
            added: merged.len().saturating_sub(kept_len),
            written: merged != existing,
        };

        if stats.written {
            self.write(&merged)?;
        }

        Ok(stats)
    }

    /// Write records to the store, replacing its content.
    ///
    /// Records are expected in canonical order. Writes are atomic: write to .tmp then rename.
    pub fn write(&self, records: &[PriceRecord]) -> Result<(), DataError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| DataError::StoreError(format!("failed to create dir: {e}")))?;
            }
        }

        let df = records_to_dataframe(records)?;
        let tmp_path = self.path.with_extension("parquet.tmp");
        write_parquet(&df, &tmp_path)?;
        rename_into_place(&tmp_path, &self.path)?;

        if self.write_csv {
            let csv_path = self.csv_path();
            let tmp_csv = csv_path.with_extension("csv.tmp");
            write_csv(records, &tmp_csv)?;
            rename_into_place(&tmp_csv, &csv_path)?;
        }

        let meta = build_meta(records)?;
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::StoreError(format!("meta serialization: {e}")))?;
        let meta_path = self.meta_path();
        let tmp_meta = meta_path.with_extension("json.tmp");
        fs::write(&tmp_meta, meta_json)
            .map_err(|e| DataError::StoreError(format!("meta write: {e}")))?;
        rename_into_place(&tmp_meta, &meta_path)?;

        tracing::debug!(path = %self.path.display(), rows = records.len(), "store written");
        Ok(())
    }

    /// Read the metadata sidecar, if present and parseable.
    pub fn get_meta(&self) -> Option<StoreMeta> {
        let content = fs::read_to_string(self.meta_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Store status. Falls back to loading the Parquet file when the sidecar is missing.
    pub fn status(&self) -> Result<StoreStatus, DataError> {
        if !self.exists() {
            return Ok(StoreStatus {
                path: self.path.clone(),
                exists: false,
                meta: None,
            });
        }

        let meta = match self.get_meta() {
            Some(meta) => meta,
            None => build_meta(&self.load()?)?,
        };

        Ok(StoreStatus {
            path: self.path.clone(),
            exists: true,
            meta: Some(meta),
        })
    }
}

fn rename_into_place(tmp_path: &Path, path: &Path) -> Result<(), DataError> {
    fs::rename(tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(tmp_path);
        DataError::StoreError(format!("atomic rename failed: {e}"))
    })
}

fn build_meta(records: &[PriceRecord]) -> Result<StoreMeta, DataError> {
    let zones: BTreeSet<Zone> = records.iter().map(|r| r.zone).collect();
    let data_hash = blake3::hash(
        &serde_json::to_vec(records)
            .map_err(|e| DataError::StoreError(format!("hash serialization: {e}")))?,
    )
    .to_hex()
    .to_string();

    Ok(StoreMeta {
        rows: records.len(),
        first_timestamp: records.iter().map(|r| r.timestamp).min(),
        last_timestamp: records.iter().map(|r| r.timestamp).max(),
        zones: zones.into_iter().collect(),
        data_hash,
        updated_at: chrono::Local::now().naive_local(),
    })
}

// ── Parquet / CSV I/O helpers ───────────────────────────────────────

/// Convert records to a DataFrame with the store schema.
pub fn records_to_dataframe(records: &[PriceRecord]) -> Result<DataFrame, DataError> {
    let years: Vec<i32> = records.iter().map(|r| r.year).collect();
    let months: Vec<i32> = records.iter().map(|r| r.month as i32).collect();
    let days: Vec<i32> = records.iter().map(|r| r.day as i32).collect();
    let periods: Vec<i32> = records.iter().map(|r| r.period as i32).collect();
    let mains: Vec<f64> = records.iter().map(|r| r.price_main).collect();
    let alts: Vec<f64> = records.iter().map(|r| r.price_alt).collect();
    let timestamps: Vec<i64> = records
        .iter()
        .map(|r| r.timestamp.and_utc().timestamp_millis())
        .collect();
    let zones: Vec<&str> = records.iter().map(|r| r.zone.as_str()).collect();

    DataFrame::new(vec![
        Column::new("year".into(), years),
        Column::new("month".into(), months),
        Column::new("day".into(), days),
        Column::new("period".into(), periods),
        Column::new("price_main".into(), mains),
        Column::new("price_alt".into(), alts),
        Column::new("timestamp".into(), timestamps)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| DataError::ParquetError(format!("timestamp cast: {e}")))?,
        Column::new("zone".into(), zones),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

/// Convert a store DataFrame back to records.
pub fn dataframe_to_records(df: &DataFrame) -> Result<Vec<PriceRecord>, DataError> {
    let map_err = |e: PolarsError| DataError::ParquetError(format!("column read: {e}"));

    let year_ca = df.column("year").map_err(map_err)?.i32().map_err(map_err)?;
    let month_ca = df.column("month").map_err(map_err)?.i32().map_err(map_err)?;
    let day_ca = df.column("day").map_err(map_err)?.i32().map_err(map_err)?;
    let period_ca = df.column("period").map_err(map_err)?.i32().map_err(map_err)?;
    let main_ca = df.column("price_main").map_err(map_err)?.f64().map_err(map_err)?;
    let alt_ca = df.column("price_alt").map_err(map_err)?.f64().map_err(map_err)?;
    let ts_ca = df
        .column("timestamp")
        .map_err(map_err)?
        .datetime()
        .map_err(map_err)?;
    let zone_ca = df.column("zone").map_err(map_err)?.str().map_err(map_err)?;

    let null = |name: &str, i: usize| DataError::ParquetError(format!("null {name} at row {i}"));
    let unsigned = |name: &str, i: usize, v: i32| {
        u32::try_from(v)
            .map_err(|_| DataError::ValidationError(format!("negative {name} {v} at row {i}")))
    };

    let n = df.height();
    let mut records = Vec::with_capacity(n);

    for i in 0..n {
        let ts_ms = ts_ca.get(i).ok_or_else(|| null("timestamp", i))?;
        let timestamp = DateTime::from_timestamp_millis(ts_ms)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| DataError::ParquetError(format!("invalid timestamp {ts_ms} at row {i}")))?;
        let zone = zone_ca
            .get(i)
            .ok_or_else(|| null("zone", i))?
            .parse::<Zone>()
            .map_err(|e| DataError::ValidationError(format!("row {i}: {e}")))?;

        records.push(PriceRecord {
            year: year_ca.get(i).ok_or_else(|| null("year", i))?,
            month: unsigned("month", i, month_ca.get(i).ok_or_else(|| null("month", i))?)?,
            day: unsigned("day", i, day_ca.get(i).ok_or_else(|| null("day", i))?)?,
            period: unsigned("period", i, period_ca.get(i).ok_or_else(|| null("period", i))?)?,
            price_main: main_ca.get(i).ok_or_else(|| null("price_main", i))?,
            price_alt: alt_ca.get(i).ok_or_else(|| null("price_alt", i))?,
            timestamp,
            zone,
        });
    }

    Ok(records)
}

/// Write a DataFrame to a Parquet file.
fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

/// Write records as CSV with the store's column order.
fn write_csv(records: &[PriceRecord], path: &Path) -> Result<(), DataError> {
    let csv_err = |e: csv::Error| DataError::StoreError(format!("write csv: {e}"));

    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record(PriceSchema::COLUMNS).map_err(csv_err)?;

    for r in records {
        wtr.write_record([
            r.year.to_string(),
            r.month.to_string(),
            r.day.to_string(),
            r.period.to_string(),
            r.price_main.to_string(),
            r.price_alt.to_string(),
            r.timestamp.format(CSV_TIMESTAMP_FORMAT).to_string(),
            r.zone.to_string(),
        ])
        .map_err(csv_err)?;
    }

    wtr.flush()
        .map_err(|e| DataError::StoreError(format!("flush csv: {e}")))?;
    Ok(())
}

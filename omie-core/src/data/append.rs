//! Appender: parses raw files and merges them into the price stores.
//!
//! Pipeline per file: read → parse → normalise to hourly records (plus
//! 15-minute records for quarter-hour days on or after the switch date) →
//! merge into the stores. A file that fails to parse aborts before any store
//! is touched.

use super::canonicalize::MergePolicy;
use super::provider::DataError;
use super::raw::{RawArchive, RawDay, RawFile};
use super::record::{hourly_records, quarter_hour_records, PriceRecord};
use super::store::{MergeStats, PriceStore};
use crate::config::OmieConfig;
use chrono::NaiveDate;
use serde::Serialize;

/// What an append or rebuild did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppendSummary {
    /// Raw files whose records went into the merge.
    pub files: Vec<String>,
    /// Raw files skipped because they could not be parsed, with the reason.
    pub skipped: Vec<(String, String)>,
    pub hourly: MergeStats,
    /// `None` when no 15-minute records were involved.
    pub quarter_hour: Option<MergeStats>,
}

impl AppendSummary {
    pub fn changed(&self) -> bool {
        self.hourly.written || self.quarter_hour.as_ref().is_some_and(|q| q.written)
    }
}

/// Records parsed out of a batch of raw files.
#[derive(Default)]
struct Batch {
    files: Vec<String>,
    skipped: Vec<(String, String)>,
    hourly: Vec<PriceRecord>,
    quarter_hour: Vec<PriceRecord>,
}

pub struct Appender {
    hourly: PriceStore,
    quarter_hour: Option<PriceStore>,
    quarter_hour_since: NaiveDate,
    policy: MergePolicy,
}

impl Appender {
    pub fn new(hourly: PriceStore, policy: MergePolicy) -> Self {
        Self {
            hourly,
            quarter_hour: None,
            quarter_hour_since: NaiveDate::MAX,
            policy,
        }
    }

    /// Also keep 15-minute records for quarter-hour days from `since` on.
    pub fn with_quarter_hour_store(mut self, store: PriceStore, since: NaiveDate) -> Self {
        self.quarter_hour = Some(store);
        self.quarter_hour_since = since;
        self
    }

    pub fn from_config(config: &OmieConfig) -> Self {
        let write_csv = config.store.write_csv;
        Self::new(
            PriceStore::new(config.paths.hourly_store_path()).with_csv(write_csv),
            config.store.merge_policy,
        )
        .with_quarter_hour_store(
            PriceStore::new(config.paths.quarter_hour_store_path()).with_csv(write_csv),
            config.store.quarter_hour_since,
        )
    }

    pub fn hourly_store(&self) -> &PriceStore {
        &self.hourly
    }

    pub fn quarter_hour_store(&self) -> Option<&PriceStore> {
        self.quarter_hour.as_ref()
    }

    /// Append the most recently downloaded raw file.
    pub fn append_latest(&self, archive: &RawArchive) -> Result<AppendSummary, DataError> {
        let file = archive.latest()?;
        self.append_file(&file)
    }

    /// Append one raw file. Any parse error aborts with the stores untouched.
    pub fn append_file(&self, file: &RawFile) -> Result<AppendSummary, DataError> {
        let mut batch = Batch::default();
        self.add_to_batch(&mut batch, file)?;
        self.merge_batch(batch)
    }

    /// Append every raw file in the archive; unparsable files are skipped.
    pub fn append_all(&self, archive: &RawArchive) -> Result<AppendSummary, DataError> {
        let files = archive.list()?;
        if files.is_empty() {
            return Err(DataError::NoRawFile {
                dir: archive.dir().to_path_buf(),
            });
        }

        let batch = self.parse_lenient(&files);
        self.merge_batch(batch)
    }

    /// Drop store rows delivered on or after `since` and regenerate them from
    /// the raw files for those days.
    pub fn rebuild_since(&self, archive: &RawArchive, since: NaiveDate) -> Result<AppendSummary, DataError> {
        let files: Vec<RawFile> = archive
            .list()?
            .into_iter()
            .filter(|f| f.date >= since)
            .collect();
        if files.is_empty() {
            return Err(DataError::NoRawFile {
                dir: archive.dir().to_path_buf(),
            });
        }

        let batch = self.parse_lenient(&files);
        if batch.files.is_empty() {
            return Err(DataError::ValidationError(format!(
                "none of the {} raw files since {since} could be parsed",
                files.len()
            )));
        }

        let hourly = self.hourly.replace_since(since, &batch.hourly)?;
        tracing::info!(
            since = %since,
            files = batch.files.len(),
            rows = hourly.after,
            "hourly store rebuilt"
        );

        let quarter_hour = match &self.quarter_hour {
            Some(store) if !batch.quarter_hour.is_empty() || store.exists() => {
                Some(store.replace_since(since, &batch.quarter_hour)?)
            }
            _ => None,
        };

        Ok(AppendSummary {
            files: batch.files,
            skipped: batch.skipped,
            hourly,
            quarter_hour,
        })
    }

    fn parse_lenient(&self, files: &[RawFile]) -> Batch {
        let mut batch = Batch::default();
        for file in files {
            if let Err(e) = self.add_to_batch(&mut batch, file) {
                tracing::warn!(file = %file.file_name(), error = %e, "skipping raw file");
                batch.skipped.push((file.file_name(), e.to_string()));
            }
        }
        batch
    }

    fn add_to_batch(&self, batch: &mut Batch, file: &RawFile) -> Result<(), DataError> {
        let day = RawDay::read(file)?;
        let hourly = hourly_records(&day);
        tracing::debug!(file = %file.file_name(), periods = day.periods.len(), rows = hourly.len(), "parsed raw file");
        batch.hourly.extend(hourly);

        if self.quarter_hour.is_some() && file.date >= self.quarter_hour_since {
            if let Some(quarters) = quarter_hour_records(&day) {
                batch.quarter_hour.extend(quarters);
            }
        }

        batch.files.push(file.file_name());
        Ok(())
    }

    fn merge_batch(&self, batch: Batch) -> Result<AppendSummary, DataError> {
        let hourly = self.hourly.merge(&batch.hourly, self.policy)?;
        tracing::info!(
            path = %self.hourly.path().display(),
            added = hourly.added,
            rows = hourly.after,
            written = hourly.written,
            "hourly store merged"
        );

        let quarter_hour = match &self.quarter_hour {
            Some(store) if !batch.quarter_hour.is_empty() => {
                let stats = store.merge(&batch.quarter_hour, self.policy)?;
                tracing::info!(
                    path = %store.path().display(),
                    added = stats.added,
                    rows = stats.after,
                    written = stats.written,
                    "15-minute store merged"
                );
                Some(stats)
            }
            _ => None,
        };

        Ok(AppendSummary {
            files: batch.files,
            skipped: batch.skipped,
            hourly,
            quarter_hour,
        })
    }
}

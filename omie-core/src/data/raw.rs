//! Raw OMIE marginal price files.
//!
//! Layout: `{data_dir}/marginalpdbc_{YYYYMMDD}.{variant}`
//!
//! File format (semicolon separated, one header line, `*` terminator):
//!
//! ```text
//! MARGINALPDBC;
//! 2024;01;02;1;74.50;74.50;
//! 2024;01;02;2;70.10;70.10;
//! *
//! ```

use super::provider::DataError;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "marginalpdbc_";
const HEADER: &str = "MARGINALPDBC";

/// Highest period a raw file may carry: 25 hours on a long DST day is 100 quarter-hours.
pub const MAX_PERIOD: u32 = 100;

/// File name for a delivery date and variant: `marginalpdbc_20240102.1`.
pub fn raw_file_name(date: NaiveDate, variant: &str) -> String {
    format!("{FILE_PREFIX}{}.{variant}", date.format("%Y%m%d"))
}

/// True if the body looks like a marginal price file (header line present).
pub fn is_marginal_price_file(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body);
    text.trim_start_matches('\u{feff}')
        .lines()
        .next()
        .is_some_and(|first| first.trim().starts_with(HEADER))
}

/// A raw file on disk, identified by its date key and variant suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub path: PathBuf,
    pub date: NaiveDate,
    pub variant: String,
}

impl RawFile {
    /// Parse `marginalpdbc_YYYYMMDD.N` out of a path. Anything else is `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let rest = name.strip_prefix(FILE_PREFIX)?;
        let (date_str, variant) = rest.split_once('.')?;

        if date_str.len() != 8 || variant.is_empty() || !variant.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let date = NaiveDate::parse_from_str(date_str, "%Y%m%d").ok()?;

        Some(Self {
            path: path.to_path_buf(),
            date,
            variant: variant.to_string(),
        })
    }

    pub fn file_name(&self) -> String {
        raw_file_name(self.date, &self.variant)
    }
}

/// The directory of downloaded raw files.
pub struct RawArchive {
    dir: PathBuf,
}

impl RawArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate, variant: &str) -> PathBuf {
        self.dir.join(raw_file_name(date, variant))
    }

    /// All raw files, sorted by date then variant. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<RawFile>, DataError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir)
            .map_err(|e| DataError::StoreError(format!("read dir {}: {e}", self.dir.display())))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::StoreError(format!("dir entry: {e}")))?;
            if let Some(file) = RawFile::from_path(&entry.path()) {
                files.push(file);
            }
        }

        files.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.variant.cmp(&b.variant)));
        Ok(files)
    }

    /// First existing file for a date, whatever its variant.
    pub fn find(&self, date: NaiveDate) -> Result<Option<RawFile>, DataError> {
        Ok(self.list()?.into_iter().find(|f| f.date == date))
    }

    /// The most recent delivery date on disk (lowest variant on ties).
    pub fn latest(&self) -> Result<RawFile, DataError> {
        let files = self.list()?;
        let last_date = files
            .last()
            .map(|f| f.date)
            .ok_or_else(|| DataError::NoRawFile {
                dir: self.dir.clone(),
            })?;

        files
            .into_iter()
            .find(|f| f.date == last_date)
            .ok_or_else(|| DataError::NoRawFile {
                dir: self.dir.clone(),
            })
    }

    /// Write a raw file atomically: write to `.tmp`, then rename into place.
    pub fn write(&self, date: NaiveDate, variant: &str, body: &[u8]) -> Result<PathBuf, DataError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| DataError::StoreError(format!("failed to create dir: {e}")))?;

        let path = self.path_for(date, variant);
        let tmp_path = self.dir.join(format!("{}.tmp", raw_file_name(date, variant)));

        fs::write(&tmp_path, body).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::StoreError(format!("write {}: {e}", tmp_path.display()))
        })?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::StoreError(format!("atomic rename failed: {e}"))
        })?;

        Ok(path)
    }
}

/// One period row of a raw file.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodPrice {
    pub period: u32,
    pub price_main: f64,
    pub price_alt: f64,
}

/// A parsed raw file: the delivery day and its period rows in file order.
#[derive(Debug, Clone)]
pub struct RawDay {
    pub file: RawFile,
    pub periods: Vec<PeriodPrice>,
}

impl RawDay {
    /// Read and parse a raw file from disk.
    pub fn read(file: &RawFile) -> Result<Self, DataError> {
        let bytes = fs::read(&file.path).map_err(|e| DataError::MalformedRawFile {
            file: file.file_name(),
            reason: format!("read failed: {e}"),
        })?;
        Self::parse(file, &String::from_utf8_lossy(&bytes))
    }

    /// Parse raw file content.
    ///
    /// The first line is the header; lines containing `*` are dropped. Every
    /// row must carry the file's own delivery date.
    pub fn parse(file: &RawFile, content: &str) -> Result<Self, DataError> {
        let malformed = |reason: String| DataError::MalformedRawFile {
            file: file.file_name(),
            reason,
        };

        let mut periods = Vec::new();
        let mut seen = BTreeSet::new();

        for (idx, line) in content.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() || line.contains('*') {
                continue;
            }

            let line_no = idx + 1;
            let fields: Vec<&str> = line.split(';').map(str::trim).collect();
            if fields.len() < 6 || fields[..6].iter().any(|f| f.is_empty()) {
                return Err(malformed(format!(
                    "line {line_no}: expected 6 fields, got '{line}'"
                )));
            }

            let int = |i: usize| {
                fields[i]
                    .parse::<u32>()
                    .map_err(|e| malformed(format!("line {line_no}: field {}: {e}", i + 1)))
            };
            let price = |i: usize| {
                let value = fields[i]
                    .replace(',', ".")
                    .parse::<f64>()
                    .map_err(|e| malformed(format!("line {line_no}: field {}: {e}", i + 1)))?;
                if !value.is_finite() {
                    return Err(malformed(format!("line {line_no}: field {}: non-finite price", i + 1)));
                }
                Ok(value)
            };

            let (year, month, day, period) = (int(0)?, int(1)?, int(2)?, int(3)?);
            let date = NaiveDate::from_ymd_opt(year as i32, month, day)
                .ok_or_else(|| malformed(format!("line {line_no}: invalid date {year}-{month}-{day}")))?;
            if date != file.date {
                return Err(malformed(format!(
                    "line {line_no}: row date {date} does not match file date {}",
                    file.date
                )));
            }
            if period == 0 || period > MAX_PERIOD {
                return Err(malformed(format!(
                    "line {line_no}: period {period} outside 1..={MAX_PERIOD}"
                )));
            }
            if !seen.insert(period) {
                return Err(malformed(format!("line {line_no}: duplicate period {period}")));
            }

            periods.push(PeriodPrice {
                period,
                price_main: price(4)?,
                price_alt: price(5)?,
            });
        }

        if periods.is_empty() {
            return Err(malformed("no price rows".into()));
        }
        // An hourly day has 23..=25 rows; anything past 25 must be a quarter-hour day
        if let Some(&max) = seen.last() {
            if max > 25 && periods.len() <= 25 {
                return Err(malformed(format!(
                    "{} rows but period {max}: neither an hourly nor a quarter-hour day",
                    periods.len()
                )));
            }
        }

        Ok(Self {
            file: file.clone(),
            periods,
        })
    }

    pub fn max_period(&self) -> u32 {
        self.periods.iter().map(|p| p.period).max().unwrap_or(0)
    }
}

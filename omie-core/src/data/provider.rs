//! Price source trait and structured error types.
//!
//! The PriceSource trait abstracts over where raw OMIE files come from
//! (the OMIE website, a mirror, a fixture directory) so the fetcher can be
//! exercised without the network.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for fetch, parse and store operations.
///
/// These are designed to be displayable directly from the CLI.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("no price file for {date}: {}", reasons.join("; "))]
    FetchFailed { date: NaiveDate, reasons: Vec<String> },

    #[error("no raw price files in {}", dir.display())]
    NoRawFile { dir: PathBuf },

    #[error("malformed raw file {file}: {reason}")]
    MalformedRawFile { file: String, reason: String },

    #[error("store error: {0}")]
    StoreError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("config error: {0}")]
    ConfigError(String),
}

/// Body of one raw file as returned by a source.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub date: NaiveDate,
    pub variant: String,
    pub url: String,
    pub body: Vec<u8>,
}

/// Trait for raw price file sources.
///
/// A source only knows how to retrieve one `(date, variant)` file. Choosing
/// between variants, validating the body and persisting it is the fetcher's job.
pub trait PriceSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the raw file for a delivery date and variant suffix.
    fn fetch(&self, date: NaiveDate, variant: &str) -> Result<FetchedFile, DataError>;
}

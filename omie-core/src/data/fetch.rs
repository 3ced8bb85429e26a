//! Fetch orchestrator: downloads one delivery day into the raw archive.

use super::provider::{DataError, PriceSource};
use super::raw::{is_marginal_price_file, RawArchive};
use chrono::NaiveDate;
use std::path::PathBuf;

/// The delivery date the scheduled fetch targets: the day after `today`.
pub fn tomorrow(today: NaiveDate) -> Result<NaiveDate, DataError> {
    today
        .succ_opt()
        .ok_or_else(|| DataError::ConfigError(format!("no day after {today}")))
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A new raw file was written.
    Downloaded { path: PathBuf, url: String },
    /// A file for the date was already on disk; nothing was requested.
    AlreadyPresent { path: PathBuf },
}

impl FetchOutcome {
    pub fn path(&self) -> &PathBuf {
        match self {
            FetchOutcome::Downloaded { path, .. } | FetchOutcome::AlreadyPresent { path } => path,
        }
    }
}

/// Download the raw file for `date`, trying each variant in order.
///
/// If a file for the date already exists and `force` is false, returns
/// `AlreadyPresent` without touching the network. The first variant that
/// answers with a marginal price file wins. If none does, no file is written.
pub fn fetch_day(
    source: &dyn PriceSource,
    archive: &RawArchive,
    date: NaiveDate,
    variants: &[String],
    force: bool,
) -> Result<FetchOutcome, DataError> {
    if !force {
        if let Some(existing) = archive.find(date)? {
            tracing::info!(path = %existing.path.display(), "raw file already present");
            return Ok(FetchOutcome::AlreadyPresent {
                path: existing.path,
            });
        }
    }

    let mut reasons = Vec::new();

    for variant in variants {
        match source.fetch(date, variant) {
            Ok(fetched) => {
                if !is_marginal_price_file(&fetched.body) {
                    tracing::warn!(url = %fetched.url, "response is not a marginal price file");
                    reasons.push(
                        DataError::ResponseFormatChanged(format!(
                            "{}: missing MARGINALPDBC header",
                            fetched.url
                        ))
                        .to_string(),
                    );
                    continue;
                }

                let path = archive.write(date, variant, &fetched.body)?;
                tracing::info!(
                    source = source.name(),
                    url = %fetched.url,
                    path = %path.display(),
                    bytes = fetched.body.len(),
                    "raw file downloaded"
                );
                return Ok(FetchOutcome::Downloaded {
                    path,
                    url: fetched.url,
                });
            }
            Err(e) => {
                tracing::warn!(%date, variant = variant.as_str(), error = %e, "variant failed");
                reasons.push(e.to_string());
            }
        }
    }

    Err(DataError::FetchFailed { date, reasons })
}

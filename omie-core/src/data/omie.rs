//! OMIE website price source.
//!
//! Downloads `marginalpdbc_YYYYMMDD.N` files through the public file-download
//! endpoint. One request per call: there is no retry here, the next scheduled
//! run is the retry.

use super::provider::{DataError, FetchedFile, PriceSource};
use super::raw::raw_file_name;
use crate::config::SourceConfig;
use chrono::NaiveDate;
use std::time::Duration;

/// OMIE file-download provider.
pub struct OmieProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl OmieProvider {
    pub fn new(config: &SourceConfig) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Full download URL for a delivery date and variant suffix.
    pub fn file_url(&self, date: NaiveDate, variant: &str) -> String {
        format!("{}{}", self.base_url, raw_file_name(date, variant))
    }
}

impl PriceSource for OmieProvider {
    fn name(&self) -> &str {
        "omie"
    }

    fn fetch(&self, date: NaiveDate, variant: &str) -> Result<FetchedFile, DataError> {
        let url = self.file_url(date, variant);
        tracing::debug!(%url, "requesting price file");

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(format!("{url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = resp
            .bytes()
            .map_err(|e| DataError::NetworkUnreachable(format!("reading body of {url}: {e}")))?
            .to_vec();

        Ok(FetchedFile {
            date,
            variant: variant.to_string(),
            url,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_url_appends_file_name() {
        let config = SourceConfig {
            base_url: "https://example.test/download?filename=".into(),
            ..SourceConfig::default()
        };
        let provider = OmieProvider::new(&config).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        assert_eq!(
            provider.file_url(date, "2"),
            "https://example.test/download?filename=marginalpdbc_20240309.2"
        );
    }
}

//! Collector configuration.
//!
//! Loaded from a TOML file; every field has a default, so an empty file (or
//! no file at all) gives the standard OMIE setup:
//!
//! ```toml
//! [source]
//! base_url = "https://www.omie.es/es/file-download?parents%5B0%5D=marginalpdbc&filename="
//! variants = ["1", "2"]
//! timeout_secs = 30
//!
//! [paths]
//! data_dir = "data"
//! processed_dir = "processed"
//!
//! [store]
//! merge_policy = "keep_existing"
//! write_csv = false
//! quarter_hour_since = "2025-10-01"
//! ```

use crate::data::canonicalize::MergePolicy;
use crate::data::provider::DataError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str =
    "https://www.omie.es/es/file-download?parents%5B0%5D=marginalpdbc&filename=";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OmieConfig {
    pub source: SourceConfig,
    pub paths: PathsConfig,
    pub store: StoreConfig,
}

impl OmieConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataError::ConfigError(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        toml::from_str(content).map_err(|e| DataError::ConfigError(format!("parse TOML: {e}")))
    }

    pub fn to_toml(&self) -> Result<String, DataError> {
        toml::to_string_pretty(self).map_err(|e| DataError::ConfigError(format!("serialize: {e}")))
    }
}

/// Where raw files are downloaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Prefix the raw file name is appended to.
    pub base_url: String,
    /// Variant suffixes, tried in order.
    pub variants: Vec<String>,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            variants: vec!["1".into(), "2".into()],
            timeout_secs: 30,
            user_agent: concat!("omie-collector/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub processed_dir: PathBuf,
    /// File name of the hourly store inside `processed_dir`.
    pub hourly_store: String,
    /// File name of the 15-minute store inside `processed_dir`.
    pub quarter_hour_store: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            processed_dir: PathBuf::from("processed"),
            hourly_store: "all_omie_prices.parquet".into(),
            quarter_hour_store: "omie_15min.parquet".into(),
        }
    }
}

impl PathsConfig {
    pub fn hourly_store_path(&self) -> PathBuf {
        self.processed_dir.join(&self.hourly_store)
    }

    pub fn quarter_hour_store_path(&self) -> PathBuf {
        self.processed_dir.join(&self.quarter_hour_store)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub merge_policy: MergePolicy,
    /// Mirror each store to a CSV file next to it.
    pub write_csv: bool,
    /// First delivery date kept at 15-minute resolution.
    pub quarter_hour_since: NaiveDate,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            merge_policy: MergePolicy::KeepExisting,
            write_csv: false,
            quarter_hour_since: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap_or_default(),
        }
    }
}

//! OMIE Core: day-ahead electricity price collection.
//!
//! This crate contains everything behind the `omie` binary:
//! - Fetching raw `marginalpdbc` files from OMIE into a dated archive
//! - Parsing raw files into hourly and 15-minute price records
//! - Merging records into deduplicated Parquet stores with a metadata sidecar
//! - TOML configuration

pub mod config;
pub mod data;

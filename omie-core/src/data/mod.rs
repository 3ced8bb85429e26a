//! Raw OMIE files, price records and the Parquet price stores

pub mod append;
pub mod canonicalize;
pub mod fetch;
pub mod omie;
pub mod provider;
pub mod raw;
pub mod record;
pub mod schema;
pub mod store;

pub use append::{AppendSummary, Appender};
pub use canonicalize::{Canonicalizer, MergePolicy};
pub use fetch::{fetch_day, tomorrow, FetchOutcome};
pub use omie::OmieProvider;
pub use provider::{DataError, FetchedFile, PriceSource};
pub use raw::{RawArchive, RawDay, RawFile};
pub use record::{PriceRecord, Resolution, Zone};
pub use schema::PriceSchema;
pub use store::{MergeStats, PriceStore, StoreMeta, StoreStatus};

use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Columns identifying a row, in sort order. `timestamp` alone is not enough:
/// hour 25 of a long DST day shares it with the next day's first hour.
pub const KEY_COLUMNS: [&str; 5] = ["timestamp", "zone", "year", "month", "day"];

/// What happens when an incoming record has the same key as a stored one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The stored record stays; the incoming one is dropped.
    #[default]
    KeepExisting,
    /// The incoming record overwrites the stored one.
    Replace,
}

/// Canonicalizer for price store frames
pub struct Canonicalizer;

impl Canonicalizer {
    /// Canonicalize data: sort by the key columns, dedupe keeping the first occurrence
    pub fn canonicalize(df: LazyFrame) -> LazyFrame {
        df.sort(
            KEY_COLUMNS,
            SortMultipleOptions::default()
                .with_order_descending_multi([false; 5])
                .with_maintain_order(true),
        )
        .unique_stable(
            Some(KEY_COLUMNS.iter().map(|c| (*c).into()).collect()),
            UniqueKeepStrategy::First,
        )
    }

    /// Merge incoming rows into the stored rows.
    ///
    /// The frame whose rows should win goes first; the stable sort keeps it first
    /// among equal keys, so `unique_stable(First)` picks it.
    pub fn merge(
        existing: DataFrame,
        incoming: DataFrame,
        policy: MergePolicy,
    ) -> PolarsResult<DataFrame> {
        let frames = match policy {
            MergePolicy::KeepExisting => [existing.lazy(), incoming.lazy()],
            MergePolicy::Replace => [incoming.lazy(), existing.lazy()],
        };
        let combined = concat(frames, UnionArgs::default())?;
        Self::canonicalize(combined).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(timestamps: &[i64], zones: &[&str], prices: &[f64]) -> DataFrame {
        let n = timestamps.len();
        df!(
            "timestamp" => timestamps,
            "zone" => zones,
            "year" => vec![2024i32; n],
            "month" => vec![1i32; n],
            "day" => vec![2i32; n],
            "price_main" => prices,
        )
        .unwrap()
    }

    #[test]
    fn sorts_by_timestamp() {
        let df = frame(&[3, 1, 2], &["Spain", "Spain", "Spain"], &[3.0, 1.0, 2.0]);

        let out = Canonicalizer::canonicalize(df.lazy()).collect().unwrap();
        let ts: Vec<Option<i64>> = out.column("timestamp").unwrap().i64().unwrap().into_iter().collect();

        assert_eq!(ts, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn same_timestamp_in_two_zones_is_kept() {
        let df = frame(&[1, 1], &["Spain", "Portugal"], &[1.0, 2.0]);
        let out = Canonicalizer::canonicalize(df.lazy()).collect().unwrap();
        assert_eq!(out.height(), 2);
    }

    #[test]
    fn same_timestamp_on_two_delivery_days_is_kept() {
        let mut df = frame(&[1, 1], &["Spain", "Spain"], &[10.0, 99.0]);
        df.with_column(Column::new("day".into(), &[27i32, 28])).unwrap();

        let out = Canonicalizer::merge(df.clone(), df, MergePolicy::KeepExisting).unwrap();
        assert_eq!(out.height(), 2);
    }

    #[test]
    fn keep_existing_drops_incoming_duplicate() {
        let existing = frame(&[1, 2], &["Spain", "Spain"], &[10.0, 20.0]);
        let incoming = frame(&[2, 3], &["Spain", "Spain"], &[99.0, 30.0]);

        let merged = Canonicalizer::merge(existing, incoming, MergePolicy::KeepExisting).unwrap();
        let prices = merged.column("price_main").unwrap().f64().unwrap();

        assert_eq!(merged.height(), 3);
        assert_eq!(prices.get(1), Some(20.0));
        assert_eq!(prices.get(2), Some(30.0));
    }

    #[test]
    fn replace_overwrites_stored_row() {
        let existing = frame(&[1, 2], &["Spain", "Spain"], &[10.0, 20.0]);
        let incoming = frame(&[2, 3], &["Spain", "Spain"], &[99.0, 30.0]);

        let merged = Canonicalizer::merge(existing, incoming, MergePolicy::Replace).unwrap();
        let prices = merged.column("price_main").unwrap().f64().unwrap();

        assert_eq!(merged.height(), 3);
        assert_eq!(prices.get(0), Some(10.0));
        assert_eq!(prices.get(1), Some(99.0));
    }

    #[test]
    fn policy_names_in_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: MergePolicy,
        }
        let w: Wrapper = toml::from_str("policy = \"replace\"").unwrap();
        assert_eq!(w.policy, MergePolicy::Replace);
        assert_eq!(MergePolicy::default(), MergePolicy::KeepExisting);
    }
}

use super::canonicalize::KEY_COLUMNS;
use polars::prelude::*;

/// Column layout of the price stores.
///
/// The key columns (timestamp, zone and the delivery day) may not contain nulls.
pub struct PriceSchema;

impl PriceSchema {
    pub const COLUMNS: [&'static str; 8] = [
        "year",
        "month",
        "day",
        "period",
        "price_main",
        "price_alt",
        "timestamp",
        "zone",
    ];

    pub const KEY: [&'static str; 5] = KEY_COLUMNS;

    pub fn dtype_of(column: &str) -> Option<DataType> {
        match column {
            "year" | "month" | "day" | "period" => Some(DataType::Int32),
            "price_main" | "price_alt" => Some(DataType::Float64),
            "timestamp" => Some(DataType::Datetime(TimeUnit::Milliseconds, None)),
            "zone" => Some(DataType::String),
            _ => None,
        }
    }

    pub fn schema() -> Schema {
        Self::COLUMNS
            .iter()
            .filter_map(|name| Self::dtype_of(name).map(|dt| Field::new((*name).into(), dt)))
            .collect()
    }

    /// Cast columns written with wider or finer types to the store types.
    ///
    /// Stores written by pandas carry Int64 integers and nanosecond timestamps.
    /// Integers and floats widen or narrow to the store type; overflow is an
    /// error. Naive datetimes of any unit become milliseconds. Anything else is
    /// left for [`validate`](Self::validate) to reject.
    pub fn coerce(mut df: DataFrame) -> Result<DataFrame, SchemaError> {
        for name in Self::COLUMNS {
            let (Some(expected), Ok(column)) = (Self::dtype_of(name), df.column(name)) else {
                continue;
            };
            let actual = column.dtype().clone();
            if actual == expected || !Self::castable(&actual, &expected) {
                continue;
            }

            let cast = column
                .strict_cast(&expected)
                .map_err(|e| SchemaError::CastFailed {
                    column: name.to_string(),
                    from: actual.clone(),
                    reason: e.to_string(),
                })?;
            df.with_column(cast).map_err(|e| SchemaError::CastFailed {
                column: name.to_string(),
                from: actual,
                reason: e.to_string(),
            })?;
        }
        Ok(df)
    }

    fn castable(actual: &DataType, expected: &DataType) -> bool {
        match expected {
            DataType::Int32 => actual.is_integer(),
            DataType::Float64 => actual.is_float() || actual.is_integer(),
            DataType::Datetime(_, None) => matches!(actual, DataType::Datetime(_, None)),
            _ => false,
        }
    }

    /// Check a loaded store frame: every column present with its dtype, no null keys.
    ///
    /// Extra columns are tolerated.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        for name in Self::COLUMNS {
            let column = df
                .column(name)
                .map_err(|_| SchemaError::MissingColumn(name.to_string()))?;

            let expected = Self::dtype_of(name).unwrap_or(DataType::Null);
            if column.dtype() != &expected {
                return Err(SchemaError::TypeMismatch {
                    column: name.to_string(),
                    expected,
                    actual: column.dtype().clone(),
                });
            }
        }

        for name in Self::KEY {
            let nulls = df.column(name).map(|c| c.null_count()).unwrap_or(0);
            if nulls > 0 {
                return Err(SchemaError::NullKey {
                    column: name.to_string(),
                    count: nulls,
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("store is missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has type {actual:?}, expected {expected:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("column '{column}' of type {from:?} could not be converted: {reason}")]
    CastFailed {
        column: String,
        from: DataType,
        reason: String,
    },

    #[error("key column '{column}' has {count} null value(s)")]
    NullKey { column: String, count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamps(values: &[Option<i64>]) -> Column {
        Column::new("timestamp".into(), values)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap()
    }

    fn store_frame(price_main: Column, ts: Column) -> DataFrame {
        DataFrame::new(vec![
            Column::new("year".into(), &[2024i32]),
            Column::new("month".into(), &[1i32]),
            Column::new("day".into(), &[2i32]),
            Column::new("period".into(), &[1i32]),
            price_main,
            Column::new("price_alt".into(), &[74.5]),
            ts,
            Column::new("zone".into(), &["Spain"]),
        ])
        .unwrap()
    }

    #[test]
    fn schema_lists_every_column_in_order() {
        let schema = PriceSchema::schema();
        let names: Vec<&str> = schema.iter_names().map(|n| n.as_str()).collect();
        assert_eq!(names, PriceSchema::COLUMNS);
    }

    #[test]
    fn accepts_store_frame() {
        let df = store_frame(
            Column::new("price_main".into(), &[74.5]),
            timestamps(&[Some(1704153600000)]),
        );
        assert!(PriceSchema::validate(&df).is_ok());
    }

    #[test]
    fn rejects_missing_column() {
        let df = DataFrame::new(vec![
            timestamps(&[Some(1704153600000)]),
            Column::new("price_main".into(), &[74.5]),
        ])
        .unwrap();

        let err = PriceSchema::validate(&df).unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn(ref c) if c == "year"));
    }

    #[test]
    fn rejects_text_prices() {
        let df = store_frame(
            Column::new("price_main".into(), &["74,50"]),
            timestamps(&[Some(1704153600000)]),
        );
        let err = PriceSchema::validate(&df).unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { ref column, .. } if column == "price_main"));
    }

    #[test]
    fn coerces_pandas_types() {
        let ns = Column::new("timestamp".into(), &[1704153600000000000i64])
            .cast(&DataType::Datetime(TimeUnit::Nanoseconds, None))
            .unwrap();
        let df = DataFrame::new(vec![
            Column::new("year".into(), &[2024i64]),
            Column::new("month".into(), &[1i64]),
            Column::new("day".into(), &[2i64]),
            Column::new("period".into(), &[1i64]),
            Column::new("price_main".into(), &[74.5]),
            Column::new("price_alt".into(), &[74.5]),
            ns,
            Column::new("zone".into(), &["Spain"]),
        ])
        .unwrap();

        let df = PriceSchema::coerce(df).unwrap();
        PriceSchema::validate(&df).unwrap();

        let ts = df.column("timestamp").unwrap().datetime().unwrap();
        assert_eq!(ts.get(0), Some(1704153600000));
        assert_eq!(df.column("year").unwrap().i32().unwrap().get(0), Some(2024));
    }

    #[test]
    fn coerce_rejects_overflowing_integers() {
        let df = store_frame(
            Column::new("price_main".into(), &[74.5]),
            timestamps(&[Some(1704153600000)]),
        );
        let mut df = df;
        df.with_column(Column::new("period".into(), &[i64::MAX])).unwrap();

        let err = PriceSchema::coerce(df).unwrap_err();
        assert!(matches!(err, SchemaError::CastFailed { ref column, .. } if column == "period"));
    }

    #[test]
    fn coerce_leaves_text_prices_for_validate() {
        let df = store_frame(
            Column::new("price_main".into(), &["74,50"]),
            timestamps(&[Some(1704153600000)]),
        );
        let df = PriceSchema::coerce(df).unwrap();
        assert!(matches!(
            PriceSchema::validate(&df),
            Err(SchemaError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn rejects_null_timestamp() {
        let df = store_frame(Column::new("price_main".into(), &[74.5]), timestamps(&[None]));
        let err = PriceSchema::validate(&df).unwrap_err();
        assert!(matches!(err, SchemaError::NullKey { count: 1, .. }));
    }
}

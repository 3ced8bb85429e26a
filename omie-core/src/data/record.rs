//! Price records: the rows of the price stores.

use super::raw::{PeriodPrice, RawDay};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Market zone, derived from the raw file's variant suffix (`.1` Spain, otherwise Portugal).
///
/// Variant order matches the alphabetical order of the stored names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Zone {
    Portugal,
    Spain,
}

impl Zone {
    pub fn from_variant(variant: &str) -> Self {
        if variant == "1" {
            Zone::Spain
        } else {
            Zone::Portugal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Spain => "Spain",
            Zone::Portugal => "Portugal",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Spain" => Ok(Zone::Spain),
            "Portugal" => Ok(Zone::Portugal),
            other => Err(format!("unknown zone '{other}'")),
        }
    }
}

/// Granularity of a raw day. OMIE moved from 24 hourly to 96 quarter-hour periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Hourly,
    QuarterHourly,
}

impl Resolution {
    /// More than 25 periods means quarter-hours; 23 and 25 are short and long DST days.
    pub fn of(day: &RawDay) -> Self {
        if day.max_period() > 25 {
            Resolution::QuarterHourly
        } else {
            Resolution::Hourly
        }
    }

    pub fn period_minutes(&self) -> i64 {
        match self {
            Resolution::Hourly => 60,
            Resolution::QuarterHourly => 15,
        }
    }
}

/// `(timestamp, zone, year, month, day)`.
pub type RecordKey = (NaiveDateTime, Zone, i32, u32, u32);

/// One timestamped price row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Hour (1..=25) in the hourly store, quarter (1..=100) in the 15-minute store.
    pub period: u32,
    pub price_main: f64,
    pub price_alt: f64,
    pub timestamp: NaiveDateTime,
    pub zone: Zone,
}

impl PriceRecord {
    pub fn new(
        date: NaiveDate,
        period: u32,
        resolution: Resolution,
        price_main: f64,
        price_alt: f64,
        zone: Zone,
    ) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            period,
            price_main,
            price_alt,
            timestamp: period_start(date, period, resolution),
            zone,
        }
    }

    /// Delivery date (the market day), not the timestamp's calendar day.
    pub fn delivery_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// Dedup key of the stores, in store order.
    ///
    /// The delivery day is part of the key: hour 25 of a long DST day starts
    /// at the next day's 00:00 and must not replace that day's first hour.
    pub fn key(&self) -> RecordKey {
        (self.timestamp, self.zone, self.year, self.month, self.day)
    }
}

/// Wall-clock start of a period: `date + (period - 1) * period length`.
pub fn period_start(date: NaiveDate, period: u32, resolution: Resolution) -> NaiveDateTime {
    let offset = i64::from(period.saturating_sub(1)) * resolution.period_minutes();
    date.and_time(NaiveTime::MIN) + Duration::minutes(offset)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Hourly records for a raw day.
///
/// Hourly files map one period to one record. Quarter-hour files are averaged
/// in groups of four and rounded to two decimals.
pub fn hourly_records(day: &RawDay) -> Vec<PriceRecord> {
    let date = day.file.date;
    let zone = Zone::from_variant(&day.file.variant);

    match Resolution::of(day) {
        Resolution::Hourly => {
            let mut periods: Vec<&PeriodPrice> = day.periods.iter().collect();
            periods.sort_by_key(|p| p.period);
            periods
                .into_iter()
                .map(|p| {
                    PriceRecord::new(date, p.period, Resolution::Hourly, p.price_main, p.price_alt, zone)
                })
                .collect()
        }
        Resolution::QuarterHourly => {
            let mut by_hour: BTreeMap<u32, (f64, f64, u32)> = BTreeMap::new();
            for p in &day.periods {
                let hour = (p.period - 1) / 4 + 1;
                let acc = by_hour.entry(hour).or_insert((0.0, 0.0, 0));
                acc.0 += p.price_main;
                acc.1 += p.price_alt;
                acc.2 += 1;
            }

            by_hour
                .into_iter()
                .map(|(hour, (main, alt, n))| {
                    let n = f64::from(n);
                    PriceRecord::new(
                        date,
                        hour,
                        Resolution::Hourly,
                        round2(main / n),
                        round2(alt / n),
                        zone,
                    )
                })
                .collect()
        }
    }
}

/// 15-minute records for a quarter-hour raw day; `None` for hourly days.
pub fn quarter_hour_records(day: &RawDay) -> Option<Vec<PriceRecord>> {
    if Resolution::of(day) != Resolution::QuarterHourly {
        return None;
    }

    let date = day.file.date;
    let zone = Zone::from_variant(&day.file.variant);
    let mut periods: Vec<&PeriodPrice> = day.periods.iter().collect();
    periods.sort_by_key(|p| p.period);

    Some(
        periods
            .into_iter()
            .map(|p| {
                PriceRecord::new(
                    date,
                    p.period,
                    Resolution::QuarterHourly,
                    p.price_main,
                    p.price_alt,
                    zone,
                )
            })
            .collect(),
    )
}

//! Per-entity reading series and calendar resampling.
//!
//! Buckets follow the timestamp's own wall-clock components: a day is the
//! date part, a week runs Monday to Sunday and is labelled by its Sunday, an
//! hour is `0..=23`. Buckets with no readings never appear in the output.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate, Timelike};
use meter_core::error::{MeterError, Result};
use meter_core::models::{Aggregation, Reading, SeriesStats, SummaryRecord};

// ── EntitySeries ──────────────────────────────────────────────────────────────

/// All readings of one named entity, sorted ascending by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySeries {
    name: String,
    readings: Vec<Reading>,
}

impl EntitySeries {
    /// Create an empty series.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            readings: Vec::new(),
        }
    }

    /// Create a series from `readings` in one step.
    pub fn with_readings(name: impl Into<String>, readings: Vec<Reading>) -> Result<Self> {
        let mut series = Self::new(name);
        series.add(readings)?;
        Ok(series)
    }

    /// Replace the series contents with `readings`.
    ///
    /// Readings are stably sorted by timestamp. A NaN or infinite value fails
    /// the whole call with [`MeterError::NonFiniteValue`], two readings sharing
    /// a timestamp with [`MeterError::DuplicateTimestamp`]. Either way the
    /// previous contents are left untouched.
    pub fn add(&mut self, mut readings: Vec<Reading>) -> Result<()> {
        if let Some(bad) = readings.iter().find(|r| !r.value.is_finite()) {
            return Err(MeterError::NonFiniteValue {
                entity: self.name.clone(),
                timestamp: bad.timestamp.to_string(),
            });
        }

        readings.sort_by_key(|r| r.timestamp);

        if let Some(pair) = readings.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
            return Err(MeterError::DuplicateTimestamp {
                entity: self.name.clone(),
                timestamp: pair[0].timestamp.to_string(),
            });
        }

        self.readings = readings;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    // ── Resampling ────────────────────────────────────────────────────────────

    /// Sum of readings per calendar day, ascending.
    pub fn daily_totals(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        Buckets::new(&self.readings, |r: &Reading| r.timestamp.date(), Aggregation::Sum)
    }

    /// Mean of readings per Monday–Sunday week, labelled by the week's Sunday.
    pub fn weekly_average(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        Buckets::new(&self.readings, |r: &Reading| week_ending(r.timestamp.date()), Aggregation::Mean)
    }

    /// Mean reading per hour of day, pooled across every date.
    pub fn hour_of_day_average(&self) -> BTreeMap<u32, f64> {
        pooled(&self.readings, |r| r.timestamp.hour(), Aggregation::Mean)
    }

    /// Sum or mean per month of year (1–12), pooled across years.
    pub fn month_of_year(&self, aggregation: Aggregation) -> BTreeMap<u32, f64> {
        pooled(&self.readings, |r| r.timestamp.month(), aggregation)
    }

    // ── Statistics ────────────────────────────────────────────────────────────

    /// Total, mean of daily totals and raw extrema.
    pub fn summary(&self) -> Result<SummaryRecord> {
        let (max, min) = self.extrema()?;
        let total: f64 = self.readings.iter().map(|r| r.value).sum();

        let (days, day_sum) = self
            .daily_totals()
            .fold((0usize, 0.0f64), |(n, acc), (_, sum)| (n + 1, acc + sum));

        Ok(SummaryRecord {
            entity_name: self.name.clone(),
            total,
            mean_of_daily_totals: day_sum / days as f64,
            max,
            min,
        })
    }

    /// Count, total, mean, extrema and population standard deviation.
    pub fn statistics(&self) -> Result<SeriesStats> {
        let (max, min) = self.extrema()?;
        let count = self.readings.len();
        let total: f64 = self.readings.iter().map(|r| r.value).sum();
        let mean = total / count as f64;
        let variance = self
            .readings
            .iter()
            .map(|r| (r.value - mean).powi(2))
            .sum::<f64>()
            / count as f64;

        Ok(SeriesStats {
            count,
            total,
            mean,
            max,
            min,
            std_dev: variance.sqrt(),
        })
    }

    fn extrema(&self) -> Result<(f64, f64)> {
        if self.readings.is_empty() {
            return Err(MeterError::EmptySeries(self.name.clone()));
        }
        Ok(self
            .readings
            .iter()
            .fold((f64::NEG_INFINITY, f64::INFINITY), |(hi, lo), r| {
                (hi.max(r.value), lo.min(r.value))
            }))
    }
}

/// The Sunday closing the Monday-based week that contains `date`.
pub fn week_ending(date: NaiveDate) -> NaiveDate {
    let to_sunday = 6 - date.weekday().num_days_from_monday();
    date.checked_add_days(Days::new(u64::from(to_sunday)))
        .unwrap_or(date)
}

// ── Bucketing ─────────────────────────────────────────────────────────────────

/// Lazily groups consecutive readings sharing a key.
///
/// Relies on the key being non-decreasing over the sorted readings, which
/// holds for any calendar bucket derived from the timestamp.
struct Buckets<'a, K, F> {
    readings: &'a [Reading],
    key_fn: F,
    aggregation: Aggregation,
    _key: std::marker::PhantomData<K>,
}

impl<'a, K, F> Buckets<'a, K, F>
where
    K: PartialEq,
    F: Fn(&Reading) -> K,
{
    fn new(readings: &'a [Reading], key_fn: F, aggregation: Aggregation) -> Self {
        Self {
            readings,
            key_fn,
            aggregation,
            _key: std::marker::PhantomData,
        }
    }
}

impl<K, F> Iterator for Buckets<'_, K, F>
where
    K: PartialEq,
    F: Fn(&Reading) -> K,
{
    type Item = (K, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let readings = self.readings;
        let key = (self.key_fn)(readings.first()?);

        let len = readings
            .iter()
            .position(|r| (self.key_fn)(r) != key)
            .unwrap_or(readings.len());
        let (bucket, rest) = readings.split_at(len);
        self.readings = rest;

        let sum: f64 = bucket.iter().map(|r| r.value).sum();
        let value = match self.aggregation {
            Aggregation::Sum => sum,
            Aggregation::Mean => sum / bucket.len() as f64,
        };
        Some((key, value))
    }
}

/// Aggregate readings by a key that repeats across the series (hour, month).
fn pooled(
    readings: &[Reading],
    key_fn: impl Fn(&Reading) -> u32,
    aggregation: Aggregation,
) -> BTreeMap<u32, f64> {
    let mut acc: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for r in readings {
        let slot = acc.entry(key_fn(r)).or_insert((0.0, 0));
        slot.0 += r.value;
        slot.1 += 1;
    }
    acc.into_iter()
        .map(|(k, (sum, n))| {
            let v = match aggregation {
                Aggregation::Sum => sum,
                Aggregation::Mean => sum / n as f64,
            };
            (k, v)
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

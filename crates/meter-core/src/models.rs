use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::MeterError;

/// One time-stamped observation for a single entity.
///
/// Timestamps are local wall-clock times; calendar grouping uses their date
/// and hour components directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Local wall-clock time of the observation.
    pub timestamp: NaiveDateTime,
    /// Observed value (kWh, degrees, millimetres, ...).
    pub value: f64,
}

impl Reading {
    pub fn new(timestamp: NaiveDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Per-entity summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Entity the figures describe.
    pub entity_name: String,
    /// Sum of every reading.
    pub total: f64,
    /// Mean of the entity's daily totals.
    pub mean_of_daily_totals: f64,
    /// Largest single reading.
    pub max: f64,
    /// Smallest single reading.
    pub min: f64,
}

/// Descriptive statistics over every reading of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

/// The single globally maximal reading across all entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtremalEvent {
    pub timestamp: NaiveDateTime,
    pub entity_name: String,
    pub value: f64,
}

/// One row of the combined timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineRow {
    pub timestamp: NaiveDateTime,
    pub entity_name: String,
    pub value: f64,
}

/// Every reading of every registered entity, ordered by timestamp.
///
/// Rows sharing a timestamp are ordered by entity registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedTimeline {
    rows: Vec<TimelineRow>,
}

impl CombinedTimeline {
    pub fn from_rows(rows: Vec<TimelineRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[TimelineRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate rows belonging to `entity_name`, in timestamp order.
    pub fn for_entity<'a>(&'a self, entity_name: &'a str) -> impl Iterator<Item = &'a TimelineRow> {
        self.rows.iter().filter(move |r| r.entity_name == entity_name)
    }

    /// Sum of every value in the timeline.
    pub fn total(&self) -> f64 {
        self.rows.iter().map(|r| r.value).sum()
    }
}

/// How a bucket of readings is reduced to one number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Mean,
}

/// How a missing numeric value is repaired during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillPolicy {
    /// Drop the row and record a warning.
    #[default]
    Skip,
    /// Replace with the mean of the column's valid values.
    Mean,
    /// Replace with `0.0`.
    Zero,
    /// Carry forward the previous valid value in timestamp order.
    #[serde(rename = "ffill")]
    ForwardFill,
}

impl FromStr for FillPolicy {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" | "drop" => Ok(FillPolicy::Skip),
            "mean" => Ok(FillPolicy::Mean),
            "zero" => Ok(FillPolicy::Zero),
            "ffill" | "forward" | "forward-fill" => Ok(FillPolicy::ForwardFill),
            other => Err(MeterError::Config(format!("unknown fill policy \"{}\"", other))),
        }
    }
}

/// The kind of data a run is processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// One file per building, `timestamp` + `kwh` columns.
    Energy,
    /// One file of daily observations with one column per metric.
    Weather,
}

impl FromStr for Domain {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "energy" => Ok(Domain::Energy),
            "weather" => Ok(Domain::Weather),
            other => Err(MeterError::Config(format!("unknown domain \"{}\"", other))),
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Domain::Energy => write!(f, "energy"),
            Domain::Weather => write!(f, "weather"),
        }
    }
}

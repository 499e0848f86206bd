//! Cross-entity queries over registered series.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::OnceLock;

use meter_core::error::{MeterError, Result};
use meter_core::models::{CombinedTimeline, ExtremalEvent, SummaryRecord, TimelineRow};
use tracing::debug;

use crate::series::EntitySeries;

/// Registry of entity series plus the derived combined timeline.
///
/// The timeline is built on first use and dropped on every mutation, so a
/// query never observes a snapshot older than the registry.
#[derive(Debug, Default)]
pub struct AggregationEngine {
    series: Vec<EntitySeries>,
    index: HashMap<String, usize>,
    timeline: OnceLock<CombinedTimeline>,
}

impl AggregationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `series`.
    ///
    /// Fails with [`MeterError::EmptySeries`] when it has no readings and with
    /// [`MeterError::DuplicateEntity`] when its name is already registered, so
    /// every registered entity can be summarised.
    pub fn register(&mut self, series: EntitySeries) -> Result<()> {
        if series.is_empty() {
            return Err(MeterError::EmptySeries(series.name().to_string()));
        }
        if self.index.contains_key(series.name()) {
            return Err(MeterError::DuplicateEntity(series.name().to_string()));
        }
        debug!("Registered {} ({} readings)", series.name(), series.len());
        self.index.insert(series.name().to_string(), self.series.len());
        self.series.push(series);
        self.timeline = OnceLock::new();
        Ok(())
    }

    /// Drop every registered series.
    pub fn reset(&mut self) {
        self.series.clear();
        self.index.clear();
        self.timeline = OnceLock::new();
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&EntitySeries> {
        self.index.get(name).map(|&i| &self.series[i])
    }

    /// Registered series in registration order.
    pub fn series(&self) -> &[EntitySeries] {
        &self.series
    }

    /// Every reading of every entity ordered by timestamp, then registration.
    pub fn combined_timeline(&self) -> &CombinedTimeline {
        self.timeline.get_or_init(|| merge_series(&self.series))
    }

    /// One summary per entity, in registration order.
    pub fn summaries(&self) -> Result<Vec<SummaryRecord>> {
        self.series.iter().map(EntitySeries::summary).collect()
    }

    /// The largest reading across all entities.
    ///
    /// Ties go to the earliest timestamp, then to the entity registered first.
    pub fn global_extreme(&self) -> Result<ExtremalEvent> {
        let mut best: Option<&TimelineRow> = None;
        for row in self.combined_timeline().rows() {
            if best.map_or(true, |b| row.value > b.value) {
                best = Some(row);
            }
        }

        best.map(|row| ExtremalEvent {
            timestamp: row.timestamp,
            entity_name: row.entity_name.clone(),
            value: row.value,
        })
        .ok_or_else(|| MeterError::EmptySeries("<all entities>".to_string()))
    }

    /// The summary with the highest total; ties go to the first in `summaries`.
    pub fn top_consumer(summaries: &[SummaryRecord]) -> Option<&SummaryRecord> {
        summaries.iter().fold(None, |best: Option<&SummaryRecord>, s| match best {
            Some(b) if s.total <= b.total => Some(b),
            _ => Some(s),
        })
    }

    /// Sum of every registered reading.
    pub fn total(&self) -> f64 {
        self.series
            .iter()
            .flat_map(|s| s.readings())
            .map(|r| r.value)
            .sum()
    }

    /// Per entity, the mean of its weekly averages, in registration order.
    pub fn weekly_average_means(&self) -> Vec<(String, f64)> {
        self.series
            .iter()
            .filter_map(|s| {
                let (sum, weeks) = s
                    .weekly_average()
                    .fold((0.0, 0usize), |(sum, n), (_, mean)| (sum + mean, n + 1));
                (weeks > 0).then(|| (s.name().to_string(), sum / weeks as f64))
            })
            .collect()
    }
}

/// k-way merge of already sorted series.
fn merge_series(series: &[EntitySeries]) -> CombinedTimeline {
    let capacity = series.iter().map(EntitySeries::len).sum();
    let mut rows = Vec::with_capacity(capacity);

    // (timestamp, registration index, position); the index breaks ties.
    let mut heap = BinaryHeap::with_capacity(series.len());
    for (idx, s) in series.iter().enumerate() {
        if let Some(first) = s.readings().first() {
            heap.push(Reverse((first.timestamp, idx, 0usize)));
        }
    }

    while let Some(Reverse((timestamp, idx, pos))) = heap.pop() {
        let readings = series[idx].readings();
        rows.push(TimelineRow {
            timestamp,
            entity_name: series[idx].name().to_string(),
            value: readings[pos].value,
        });
        if let Some(next) = readings.get(pos + 1) {
            heap.push(Reverse((next.timestamp, idx, pos + 1)));
        }
    }

    debug!("Combined timeline: {} rows from {} entities", rows.len(), series.len());
    CombinedTimeline::from_rows(rows)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Row validation, cleaning and series construction.
//!
//! An [`IngestionPipeline`] turns raw delimited rows into [`EntitySeries`].
//! Problems are contained at the smallest possible scope: a bad row becomes
//! a [`RowParseError`] warning, a bad header fails one entity, and only a
//! batch where every entity failed is reported as an error.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::StringRecord;
use meter_core::error::{MeterError, Result, RowParseError};
use meter_core::models::{Domain, FillPolicy, Reading};
use meter_core::time_utils::TimezoneHandler;
use tracing::{debug, warn};

use crate::series::EntitySeries;

/// Cell contents treated as "no value" rather than as a parse failure.
const MISSING_MARKERS: &[&str] = &["", "nan", "na", "n/a", "null", "none", "-"];

// ── IngestionConfig ───────────────────────────────────────────────────────────

/// Column names and cleaning rules for one kind of input file.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Header name of the timestamp column.
    pub timestamp_field: String,
    /// Header name of the value column when a source does not name one.
    pub value_field: String,
    /// Missing-value policy per value column; unlisted columns use `Skip`.
    pub fill_policies: HashMap<String, FillPolicy>,
    /// Clamp negative values to zero (meter readings cannot run backwards).
    pub clamp_negative: bool,
    /// Zone used for timestamps carrying an explicit offset.
    pub timezone: TimezoneHandler,
}

impl IngestionConfig {
    /// Energy meters: `timestamp` + `kwh`, negatives clamped, gaps skipped.
    pub fn energy() -> Self {
        Self {
            timestamp_field: "timestamp".to_string(),
            value_field: "kwh".to_string(),
            fill_policies: HashMap::new(),
            clamp_negative: true,
            timezone: TimezoneHandler::default(),
        }
    }

    /// Weather observations: `Date` plus one column per metric.
    ///
    /// Temperature gaps take the series mean, rainfall gaps are dry days and
    /// humidity carries the last observation forward.
    pub fn weather() -> Self {
        Self {
            timestamp_field: "Date".to_string(),
            value_field: "Temperature".to_string(),
            fill_policies: HashMap::from([
                ("Temperature".to_string(), FillPolicy::Mean),
                ("Rainfall".to_string(), FillPolicy::Zero),
                ("Humidity".to_string(), FillPolicy::ForwardFill),
            ]),
            clamp_negative: false,
            timezone: TimezoneHandler::default(),
        }
    }

    pub fn for_domain(domain: Domain) -> Self {
        match domain {
            Domain::Energy => Self::energy(),
            Domain::Weather => Self::weather(),
        }
    }

    /// Set the policy for `column`, replacing any preset.
    pub fn with_fill(mut self, column: impl Into<String>, policy: FillPolicy) -> Self {
        self.fill_policies.insert(column.into(), policy);
        self
    }

    pub fn with_timezone(mut self, timezone: TimezoneHandler) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn fill_policy(&self, column: &str) -> FillPolicy {
        self.fill_policies.get(column).copied().unwrap_or_default()
    }
}

// ── Sources and results ───────────────────────────────────────────────────────

/// Raw rows for one entity, as handed over by source discovery.
#[derive(Debug, Clone)]
pub struct Source {
    pub entity: String,
    /// Value column to read; `None` uses [`IngestionConfig::value_field`].
    pub value_field: Option<String>,
    /// Every row of the file, header row included.
    pub rows: Vec<StringRecord>,
}

impl Source {
    pub fn new(entity: impl Into<String>, rows: Vec<StringRecord>) -> Self {
        Self {
            entity: entity.into(),
            value_field: None,
            rows,
        }
    }

    pub fn with_value_field(mut self, value_field: impl Into<String>) -> Self {
        self.value_field = Some(value_field.into());
        self
    }
}

/// A successfully ingested entity plus the rows that were skipped.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub series: EntitySeries,
    pub warnings: Vec<RowParseError>,
}

/// Outcome of a batch where at least one entity loaded.
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Loaded series, in source order.
    pub succeeded: Vec<EntitySeries>,
    /// Entity name → reason it was not loaded.
    pub failed: BTreeMap<String, MeterError>,
    /// Row-level warnings of the succeeded entities.
    pub warnings: Vec<RowParseError>,
}

impl BatchResult {
    /// Look up a loaded series by entity name.
    pub fn get(&self, entity: &str) -> Option<&EntitySeries> {
        self.succeeded.iter().find(|s| s.name() == entity)
    }
}

/// Fold per-entity outcomes, in source order, into a [`BatchResult`].
///
/// A repeated entity name fails with [`MeterError::DuplicateEntity`] on every
/// occurrence after the first. Returns [`MeterError::NoValidData`] when
/// nothing loaded.
pub fn collect_batch<I>(outcomes: I) -> Result<BatchResult>
where
    I: IntoIterator<Item = (String, Result<Ingested>)>,
{
    let mut batch = BatchResult::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut attempted = 0usize;

    for (entity, outcome) in outcomes {
        attempted += 1;

        let outcome = if seen.insert(entity.clone()) {
            outcome
        } else {
            Err(MeterError::DuplicateEntity(entity.clone()))
        };

        match outcome {
            Ok(ingested) => {
                for w in &ingested.warnings {
                    warn!("Skipped row: {}", w);
                }
                batch.warnings.extend(ingested.warnings);
                batch.succeeded.push(ingested.series);
            }
            Err(e) => {
                warn!("Error processing {}: {}", entity, e);
                batch.failed.entry(entity).or_insert(e);
            }
        }
    }

    debug!(
        "Batch: {} attempted, {} loaded, {} failed, {} rows skipped",
        attempted,
        batch.succeeded.len(),
        batch.failed.len(),
        batch.warnings.len()
    );

    if batch.succeeded.is_empty() {
        return Err(MeterError::NoValidData { attempted });
    }
    Ok(batch)
}

// ── IngestionPipeline ─────────────────────────────────────────────────────────

/// Validates and cleans raw rows into [`EntitySeries`].
///
/// The pipeline holds no mutable state, so one instance can serve many
/// entities concurrently.
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    config: IngestionConfig,
}

/// Where the timestamp and value live within a row.
#[derive(Debug, Clone, Copy)]
struct Layout {
    timestamp_idx: usize,
    value_idx: usize,
    /// Number of leading rows that are not data.
    skip: usize,
}

/// A row that passed validation but may still lack a value.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    line: usize,
    timestamp: NaiveDateTime,
    /// Absolute instant, for inputs that carried a UTC offset.
    instant: Option<DateTime<Utc>>,
    value: Option<f64>,
}

impl IngestionPipeline {
    pub fn new(config: IngestionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Ingest one entity reading the configured default value column.
    ///
    /// A file whose first row already parses as data is read positionally:
    /// column 0 is the timestamp and column 1 the value.
    pub fn ingest_one(&self, entity: &str, rows: &[StringRecord]) -> Result<Ingested> {
        self.ingest_rows(entity, &self.config.value_field, true, rows)
    }

    /// Ingest one entity reading the named value column; a header is required.
    pub fn ingest_column(
        &self,
        entity: &str,
        value_field: &str,
        rows: &[StringRecord],
    ) -> Result<Ingested> {
        self.ingest_rows(entity, value_field, false, rows)
    }

    /// Ingest a [`Source`], honouring its value column override.
    pub fn ingest_source(&self, source: &Source) -> Result<Ingested> {
        match &source.value_field {
            Some(field) => self.ingest_column(&source.entity, field, &source.rows),
            None => self.ingest_one(&source.entity, &source.rows),
        }
    }

    /// Ingest every source in order; see [`collect_batch`] for the outcome.
    pub fn ingest_batch(&self, sources: &[Source]) -> Result<BatchResult> {
        collect_batch(
            sources
                .iter()
                .map(|s| (s.entity.clone(), self.ingest_source(s))),
        )
    }

    // ── Private ───────────────────────────────────────────────────────────────

    fn ingest_rows(
        &self,
        entity: &str,
        value_field: &str,
        positional_ok: bool,
        rows: &[StringRecord],
    ) -> Result<Ingested> {
        let layout = self.resolve_layout(entity, value_field, positional_ok, rows)?;
        let mut warnings = Vec::new();

        let mut candidates: Vec<Candidate> = rows
            .iter()
            .enumerate()
            .skip(layout.skip)
            .filter_map(|(i, row)| match self.parse_row(layout, line_of(row, i), row) {
                Ok(c) => Some(c),
                Err(reason) => {
                    warnings.push(RowParseError::new(entity, line_of(row, i), reason));
                    None
                }
            })
            .collect();

        // Stable: among equal timestamps the earliest instant, then the
        // earliest line, stays first.
        candidates.sort_by_key(|c| (c.timestamp, c.instant));
        candidates = drop_duplicate_timestamps(entity, candidates, &mut warnings);

        let policy = self.config.fill_policy(value_field);
        let readings = fill_missing(entity, value_field, policy, &candidates, &mut warnings);

        debug!(
            "Entity {}: {} rows, {} readings, {} skipped ({:?} fill on {})",
            entity,
            rows.len().saturating_sub(layout.skip),
            readings.len(),
            warnings.len(),
            policy,
            value_field
        );

        if readings.is_empty() {
            return Err(MeterError::EmptySeries(entity.to_string()));
        }

        let series = EntitySeries::with_readings(entity, readings)?;
        Ok(Ingested { series, warnings })
    }

    /// Locate the timestamp and value columns.
    fn resolve_layout(
        &self,
        entity: &str,
        value_field: &str,
        positional_ok: bool,
        rows: &[StringRecord],
    ) -> Result<Layout> {
        let Some(first) = rows.first() else {
            return Err(MeterError::schema(entity, "missing header row"));
        };
        if first.iter().all(|cell| cell.trim().is_empty()) {
            return Err(MeterError::schema(entity, "empty header row"));
        }

        let ts_field = self.config.timestamp_field.as_str();
        let timestamp_idx = find_column(first, ts_field);
        let value_idx = find_column(first, value_field);

        if let (Some(timestamp_idx), Some(value_idx)) = (timestamp_idx, value_idx) {
            return Ok(Layout {
                timestamp_idx,
                value_idx,
                skip: 1,
            });
        }

        let looks_like_data = first.len() >= 2
            && first
                .get(0)
                .and_then(|cell| self.config.timezone.parse_timestamp(cell))
                .is_some();
        if positional_ok && looks_like_data {
            debug!("Entity {}: no header row, reading columns positionally", entity);
            return Ok(Layout {
                timestamp_idx: 0,
                value_idx: 1,
                skip: 0,
            });
        }

        let missing: Vec<&str> = [(ts_field, timestamp_idx), (value_field, value_idx)]
            .into_iter()
            .filter(|(_, idx)| idx.is_none())
            .map(|(name, _)| name)
            .collect();
        Err(MeterError::schema(
            entity,
            format!("missing required column(s): {}", missing.join(", ")),
        ))
    }

    fn parse_row(
        &self,
        layout: Layout,
        line: usize,
        row: &StringRecord,
    ) -> std::result::Result<Candidate, String> {
        let raw_ts = row
            .get(layout.timestamp_idx)
            .ok_or_else(|| "missing timestamp field".to_string())?;
        let parsed = self
            .config
            .timezone
            .parse(raw_ts)
            .ok_or_else(|| format!("unparsable timestamp \"{}\"", raw_ts.trim()))?;

        let raw_value = row
            .get(layout.value_idx)
            .ok_or_else(|| "missing value field".to_string())?
            .trim();

        let value = if is_missing(raw_value) {
            None
        } else {
            let v: f64 = raw_value
                .parse()
                .map_err(|_| format!("value \"{}\" is not numeric", raw_value))?;
            if !v.is_finite() {
                return Err(format!("value \"{}\" is not finite", raw_value));
            }
            if self.config.clamp_negative && v < 0.0 {
                Some(0.0)
            } else {
                Some(v)
            }
        };

        Ok(Candidate {
            line,
            timestamp: parsed.local,
            instant: parsed.instant,
            value,
        })
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// 1-based source line of `row`, falling back to its index.
fn line_of(row: &StringRecord, index: usize) -> usize {
    row.position()
        .map(|p| p.line() as usize)
        .unwrap_or(index + 1)
}

/// Exact header match first, then a case-insensitive one.
fn find_column(header: &StringRecord, name: &str) -> Option<usize> {
    header
        .iter()
        .position(|h| h.trim() == name)
        .or_else(|| header.iter().position(|h| h.trim().eq_ignore_ascii_case(name)))
}

fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS
        .iter()
        .any(|marker| cell.eq_ignore_ascii_case(marker))
}

/// Keep the first row of each local timestamp; report the rest.
///
/// Series are keyed by local wall-clock time, so two distinct instants that
/// share one local time after a clock falls back cannot both be kept. The
/// earlier instant wins and the later one gets its own warning rather than
/// being reported as a duplicate.
fn drop_duplicate_timestamps(
    entity: &str,
    sorted: Vec<Candidate>,
    warnings: &mut Vec<RowParseError>,
) -> Vec<Candidate> {
    let mut kept: Vec<Candidate> = Vec::with_capacity(sorted.len());
    for c in sorted {
        match kept.last() {
            Some(prev) if prev.timestamp == c.timestamp => {
                let reason = match (prev.instant, c.instant) {
                    (Some(first), Some(later)) if first != later => format!(
                        "local time {} repeats after a clock change: {} dropped, {} from line {} kept",
                        c.timestamp, later, first, prev.line
                    ),
                    _ => format!(
                        "duplicate timestamp {} (first seen on line {})",
                        c.timestamp, prev.line
                    ),
                };
                warnings.push(RowParseError::new(entity, c.line, reason));
            }
            _ => kept.push(c),
        }
    }
    kept
}

/// Apply `policy` to rows without a value, in timestamp order.
fn fill_missing(
    entity: &str,
    column: &str,
    policy: FillPolicy,
    candidates: &[Candidate],
    warnings: &mut Vec<RowParseError>,
) -> Vec<Reading> {
    let present: Vec<f64> = candidates.iter().filter_map(|c| c.value).collect();
    let mean = if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    };

    let mut previous: Option<f64> = None;
    let mut readings = Vec::with_capacity(candidates.len());

    for c in candidates {
        let value = match (c.value, policy) {
            (Some(v), _) => Some(v),
            (None, FillPolicy::Zero) => Some(0.0),
            (None, FillPolicy::Mean) => mean,
            (None, FillPolicy::ForwardFill) => previous,
            (None, FillPolicy::Skip) => None,
        };

        match value {
            Some(v) => {
                previous = Some(v);
                readings.push(Reading::new(c.timestamp, v));
            }
            None => warnings.push(RowParseError::new(
                entity,
                c.line,
                format!("missing {} value could not be filled ({:?})", column, policy),
            )),
        }
    }
    readings
}

// ── Tests ─────────────────────────────────────────────────────────────────────

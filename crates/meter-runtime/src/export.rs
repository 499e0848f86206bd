//! File exports: cleaned data, summaries and the text report.

use std::fs;
use std::path::{Path, PathBuf};

use meter_core::error::{MeterError, Result};
use meter_core::formatting::{render_energy_report, render_weather_report};
use meter_core::models::{
    Aggregation, CombinedTimeline, Domain, ExtremalEvent, SeriesStats, SummaryRecord,
};
use meter_data::engine::AggregationEngine;
use meter_data::series::EntitySeries;
use serde::Serialize;
use tracing::{debug, info};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Unit printed in the energy report.
pub const ENERGY_UNIT: &str = "kWh";

// ── Output locations ──────────────────────────────────────────────────────────

/// Where each export is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub timeline: PathBuf,
    pub summary: PathBuf,
    pub daily_totals: PathBuf,
    pub weekly_average: PathBuf,
    pub hourly_profile: PathBuf,
    pub json: PathBuf,
    pub report: PathBuf,
}

impl ExportPaths {
    pub fn for_domain(output_dir: &Path, domain: Domain) -> Self {
        let (timeline, summary, report) = match domain {
            Domain::Energy => ("cleaned_energy_data.csv", "building_summary.csv", "summary.txt"),
            Domain::Weather => (
                "weather_data.csv",
                "weather_summary.csv",
                "weather_analysis_report.txt",
            ),
        };
        Self {
            timeline: output_dir.join(timeline),
            summary: output_dir.join(summary),
            daily_totals: output_dir.join("daily_totals.csv"),
            weekly_average: output_dir.join("weekly_average.csv"),
            hourly_profile: output_dir.join("hourly_profile.csv"),
            json: output_dir.join("summary.json"),
            report: output_dir.join(report),
        }
    }
}

// ── CSV exports ───────────────────────────────────────────────────────────────

/// `timestamp,entity,value`, one row per reading, timeline order.
pub fn write_timeline_csv(timeline: &CombinedTimeline, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["timestamp", "entity", "value"])?;
    for row in timeline.rows() {
        writer.write_record([
            row.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            row.entity_name.clone(),
            row.value.to_string(),
        ])?;
    }
    writer.flush()?;
    debug!("Wrote {} timeline rows to {}", timeline.len(), path.display());
    Ok(())
}

/// `entity,total,mean_daily,max,min`, one row per entity.
pub fn write_summary_csv(summaries: &[SummaryRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["entity", "total", "mean_daily", "max", "min"])?;
    for s in summaries {
        writer.write_record([
            s.entity_name.clone(),
            s.total.to_string(),
            s.mean_of_daily_totals.to_string(),
            s.max.to_string(),
            s.min.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// `entity,date,total`, one row per entity and day with readings.
pub fn write_daily_totals_csv(series: &[EntitySeries], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["entity", "date", "total"])?;
    for s in series {
        for (day, total) in s.daily_totals() {
            writer.write_record([
                s.name().to_string(),
                day.format("%Y-%m-%d").to_string(),
                total.to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// `entity,week_ending,mean`, one row per entity and week with readings.
pub fn write_weekly_average_csv(series: &[EntitySeries], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["entity", "week_ending", "mean"])?;
    for s in series {
        for (week_ending, mean) in s.weekly_average() {
            writer.write_record([
                s.name().to_string(),
                week_ending.format("%Y-%m-%d").to_string(),
                mean.to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// `entity,hour,mean`, one row per entity and hour of day with readings.
pub fn write_hourly_profile_csv(series: &[EntitySeries], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["entity", "hour", "mean"])?;
    for s in series {
        for (hour, mean) in s.hour_of_day_average() {
            writer.write_record([s.name().to_string(), hour.to_string(), mean.to_string()])?;
        }
    }
    writer.flush()?;
    Ok(())
}

// ── JSON export ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WeeklyMean {
    entity: String,
    mean: f64,
}

/// Cross-entity sums and peaks only make sense when every entity shares a
/// unit, so weather documents leave `total` and `extreme` out.
#[derive(Debug, Serialize)]
struct JsonSummary<'a> {
    domain: Domain,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<f64>,
    entities: &'a [SummaryRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    extreme: Option<ExtremalEvent>,
    weekly_average_means: Vec<WeeklyMean>,
}

pub fn write_json_summary(
    domain: Domain,
    engine: &AggregationEngine,
    summaries: &[SummaryRecord],
    path: &Path,
) -> Result<()> {
    let (total, extreme) = match domain {
        Domain::Energy => (Some(engine.total()), Some(engine.global_extreme()?)),
        Domain::Weather => (None, None),
    };
    let weekly_average_means = engine
        .weekly_average_means()
        .into_iter()
        .map(|(entity, mean)| WeeklyMean { entity, mean })
        .collect();
    let doc = JsonSummary {
        domain,
        total,
        entities: summaries,
        extreme,
        weekly_average_means,
    };
    let json = serde_json::to_string_pretty(&doc).map_err(|e| MeterError::Other(e.into()))?;
    fs::write(path, json)?;
    Ok(())
}

// ── Reports ───────────────────────────────────────────────────────────────────

/// Rainfall accumulates over a month; every other metric is averaged.
pub fn month_aggregation_for(entity: &str) -> Aggregation {
    let metric = entity.rsplit(':').next().unwrap_or(entity);
    if metric.eq_ignore_ascii_case("rainfall") {
        Aggregation::Sum
    } else {
        Aggregation::Mean
    }
}

pub fn energy_report(engine: &AggregationEngine, summaries: &[SummaryRecord]) -> Result<String> {
    let top = AggregationEngine::top_consumer(summaries)
        .ok_or_else(|| MeterError::EmptySeries("<all entities>".to_string()))?;
    let peak = engine.global_extreme()?;
    Ok(render_energy_report(
        engine.total(),
        top,
        &peak,
        summaries,
        ENERGY_UNIT,
    ))
}

pub fn weather_report(engine: &AggregationEngine) -> Result<String> {
    let stats: Vec<(String, SeriesStats)> = engine
        .series()
        .iter()
        .map(|s| Ok((s.name().to_string(), s.statistics()?)))
        .collect::<Result<_>>()?;
    let monthly: Vec<_> = engine
        .series()
        .iter()
        .map(|s| {
            (
                s.name().to_string(),
                s.month_of_year(month_aggregation_for(s.name())),
            )
        })
        .collect();
    Ok(render_weather_report(&stats, &monthly))
}

/// Write every export for `domain` into `output_dir`.
pub fn export_all(
    engine: &AggregationEngine,
    domain: Domain,
    output_dir: &Path,
) -> Result<ExportPaths> {
    fs::create_dir_all(output_dir)?;
    let paths = ExportPaths::for_domain(output_dir, domain);
    let summaries = engine.summaries()?;

    write_timeline_csv(engine.combined_timeline(), &paths.timeline)?;
    write_summary_csv(&summaries, &paths.summary)?;
    write_daily_totals_csv(engine.series(), &paths.daily_totals)?;
    write_weekly_average_csv(engine.series(), &paths.weekly_average)?;
    write_hourly_profile_csv(engine.series(), &paths.hourly_profile)?;
    write_json_summary(domain, engine, &summaries, &paths.json)?;

    let report = match domain {
        Domain::Energy => energy_report(engine, &summaries)?,
        Domain::Weather => weather_report(engine)?,
    };
    fs::write(&paths.report, report)?;

    info!("Exports written to {}", output_dir.display());
    Ok(paths)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

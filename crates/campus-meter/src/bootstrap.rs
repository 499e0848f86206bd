use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use meter_core::settings::Settings;
use meter_core::time_utils::TimezoneHandler;
use meter_data::ingestion::{IngestionConfig, IngestionPipeline};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Metrics read from weather files when none are given on the command line.
pub const DEFAULT_WEATHER_METRICS: [&str; 3] = ["Temperature", "Rainfall", "Humidity"];

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Create the output directory (and any missing parents).
pub fn ensure_output_dir(output_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(output_dir)?;
    Ok(())
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` name to an [`EnvFilter`] directive.
///
/// tracing has no level above `error`, so `CRITICAL` maps there.
fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_lowercase(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Logs go to stderr. When `log_file` is set, a second plain-text layer
/// appends to that file.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(level_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

// ── Pipeline bootstrap ─────────────────────────────────────────────────────────

/// Build the ingestion config for the selected domain and flags.
pub fn ingestion_config(settings: &Settings) -> anyhow::Result<IngestionConfig> {
    if !TimezoneHandler::validate_timezone(&settings.timezone) {
        anyhow::bail!("unknown timezone \"{}\"", settings.timezone);
    }
    let mut config = IngestionConfig::for_domain(settings.domain()?)
        .with_timezone(TimezoneHandler::new(&settings.timezone));

    if let Some(field) = &settings.timestamp_field {
        config.timestamp_field = field.clone();
    }
    if let Some(field) = &settings.value_field {
        config.value_field = field.clone();
    }
    for (column, policy) in settings.fill_overrides()? {
        config = config.with_fill(column, policy);
    }
    Ok(config)
}

pub fn build_pipeline(settings: &Settings) -> anyhow::Result<IngestionPipeline> {
    Ok(IngestionPipeline::new(ingestion_config(settings)?))
}

/// Weather metrics to load, falling back to [`DEFAULT_WEATHER_METRICS`].
pub fn weather_metrics(settings: &Settings) -> Vec<String> {
    if settings.metrics.is_empty() {
        DEFAULT_WEATHER_METRICS.iter().map(|m| m.to_string()).collect()
    } else {
        settings.metrics.clone()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

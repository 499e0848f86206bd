mod bootstrap;

use anyhow::{Context, Result};
use meter_core::models::Domain;
use meter_core::settings::Settings;
use meter_data::engine::AggregationEngine;
use meter_data::reader::{discover_sources, EntityNamer};
use meter_runtime::export::export_all;
use meter_runtime::runner::BatchRunner;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;
    bootstrap::ensure_output_dir(&settings.output_dir)?;

    tracing::info!("Campus Meter v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Domain: {}, Data: {}, Timezone: {}, Workers: {}",
        settings.domain,
        settings.data_dir.display(),
        settings.timezone,
        settings.workers
    );

    let domain = settings.domain()?;
    let metrics = match domain {
        Domain::Energy => Vec::new(),
        Domain::Weather => bootstrap::weather_metrics(&settings),
    };

    let namer = EntityNamer::new(&settings.entity_suffix)?;
    let specs = discover_sources(&settings.data_dir, domain, &namer, &metrics)
        .with_context(|| format!("discovering sources in {}", settings.data_dir.display()))?;
    tracing::info!("Found {} sources", specs.len());

    let runner = BatchRunner::new(bootstrap::build_pipeline(&settings)?, settings.workers as usize);
    let mut engine = AggregationEngine::new();
    let report = runner.run(specs, &mut engine).await?;

    for (entity, error) in &report.failed {
        if error.is_entity_level() {
            eprintln!("Skipped {}: {}", entity, error);
        } else {
            eprintln!("Failed to load {}: {}", entity, error);
        }
    }
    if !report.warnings.is_empty() {
        eprintln!(
            "{} rows skipped during cleaning (see log for details)",
            report.warnings.len()
        );
    }

    let paths = export_all(&engine, domain, &settings.output_dir)?;

    println!("Processed {} entities.", report.registered.len());
    println!("Report:  {}", paths.report.display());
    println!("Data:    {}", paths.timeline.display());
    println!("Summary: {}", paths.summary.display());

    Ok(())
}

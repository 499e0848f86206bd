//! Parallel batch ingestion.
//!
//! Each entity is read and cleaned on a tokio blocking worker; at most
//! `workers` run at once. Outcomes are gathered in source order and handed
//! to a single writer that registers them with the [`AggregationEngine`].

use std::collections::BTreeMap;
use std::sync::Arc;

use meter_core::error::{MeterError, Result, RowParseError};
use meter_data::engine::AggregationEngine;
use meter_data::ingestion::{collect_batch, BatchResult, Ingested, IngestionPipeline};
use meter_data::reader::SourceSpec;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

// ── Public types ──────────────────────────────────────────────────────────────

/// What happened to each planned entity after a run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Entities now held by the engine, in source order.
    pub registered: Vec<String>,
    /// Entity name → reason it was not registered.
    pub failed: BTreeMap<String, MeterError>,
    /// Rows skipped while cleaning the registered entities.
    pub warnings: Vec<RowParseError>,
}

// ── BatchRunner ───────────────────────────────────────────────────────────────

/// Runs an [`IngestionPipeline`] over many sources concurrently.
pub struct BatchRunner {
    pipeline: Arc<IngestionPipeline>,
    workers: usize,
}

impl BatchRunner {
    /// `workers` is clamped to at least one.
    pub fn new(pipeline: IngestionPipeline, workers: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Load and clean every source.
    ///
    /// Per-entity failures (unreadable file, bad header, no valid rows) are
    /// collected; the call fails only when nothing loaded.
    pub async fn ingest(&self, specs: Vec<SourceSpec>) -> Result<BatchResult> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut handles = Vec::with_capacity(specs.len());

        for spec in specs {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| MeterError::Other(e.into()))?;
            let pipeline = Arc::clone(&self.pipeline);
            let entity = spec.entity.clone();

            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                load_and_ingest(&pipeline, &spec)
            });
            handles.push((entity, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (entity, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(MeterError::Other(anyhow::anyhow!(
                    "ingestion worker for {entity} failed: {e}"
                ))),
            };
            outcomes.push((entity, outcome));
        }

        collect_batch(outcomes)
    }

    /// Ingest every source and register the results with `engine`.
    ///
    /// An entity already present in the engine is reported as failed.
    pub async fn run(
        &self,
        specs: Vec<SourceSpec>,
        engine: &mut AggregationEngine,
    ) -> Result<RunReport> {
        let planned = specs.len();
        let batch = self.ingest(specs).await?;

        let mut report = RunReport {
            registered: Vec::with_capacity(batch.succeeded.len()),
            failed: batch.failed,
            warnings: batch.warnings,
        };

        for series in batch.succeeded {
            let name = series.name().to_string();
            match engine.register(series) {
                Ok(()) => report.registered.push(name),
                Err(e) => {
                    warn!("Error registering {}: {}", name, e);
                    report.failed.entry(name).or_insert(e);
                }
            }
        }

        info!(
            "Loaded {} of {} entities ({} failed, {} rows skipped)",
            report.registered.len(),
            planned,
            report.failed.len(),
            report.warnings.len()
        );
        Ok(report)
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn load_and_ingest(pipeline: &IngestionPipeline, spec: &SourceSpec) -> Result<Ingested> {
    let source = spec.load()?;
    debug!("Ingesting {} from {}", spec.entity, spec.path.display());
    pipeline.ingest_source(&source)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use meter_core::models::Domain;
    use meter_data::ingestion::IngestionConfig;
    use meter_data::reader::{discover_sources, EntityNamer, DEFAULT_ENTITY_SUFFIX};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    fn energy_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "A_usage.csv",
            "timestamp,kwh\n2023-01-01 00:00:00,10\n2023-01-01 12:00:00,20\n",
        );
        write(dir.path(), "B_usage.csv", "timestamp,kwh\n2023-01-01 06:00:00,50\n");
        write(dir.path(), "C_usage.csv", "timestamp,reading\n2023-01-01 06:00:00,5\n");
        dir
    }

    fn specs(dir: &Path, domain: Domain, metrics: &[String]) -> Vec<SourceSpec> {
        let namer = EntityNamer::new(DEFAULT_ENTITY_SUFFIX).unwrap();
        discover_sources(dir, domain, &namer, metrics).unwrap()
    }

    #[test]
    fn test_runner_clamps_workers() {
        let runner = BatchRunner::new(IngestionPipeline::new(IngestionConfig::energy()), 0);
        assert_eq!(runner.workers(), 1);
    }

    #[tokio::test]
    async fn test_run_registers_in_source_order() {
        let dir = energy_dir();
        let runner = BatchRunner::new(IngestionPipeline::new(IngestionConfig::energy()), 2);
        let mut engine = AggregationEngine::new();

        let report = runner
            .run(specs(dir.path(), Domain::Energy, &[]), &mut engine)
            .await
            .unwrap();

        assert_eq!(report.registered, vec!["A", "B"]);
        assert!(matches!(report.failed["C"], MeterError::Schema { .. }));

        let summaries = engine.summaries().unwrap();
        assert_eq!(summaries[0].total, 30.0);
        assert_eq!(summaries[1].total, 50.0);
        assert_eq!(engine.global_extreme().unwrap().entity_name, "B");
    }

    #[tokio::test]
    async fn test_run_matches_sequential_batch() {
        let dir = energy_dir();
        let pipeline = IngestionPipeline::new(IngestionConfig::energy());
        let sources: Vec<_> = specs(dir.path(), Domain::Energy, &[])
            .iter()
            .map(|s| s.load().unwrap())
            .collect();
        let sequential = pipeline.ingest_batch(&sources).unwrap();

        let runner = BatchRunner::new(pipeline, 4);
        let parallel = runner.ingest(specs(dir.path(), Domain::Energy, &[])).await.unwrap();

        let names = |b: &BatchResult| -> Vec<String> {
            b.succeeded.iter().map(|s| s.name().to_string()).collect()
        };
        assert_eq!(names(&sequential), names(&parallel));
        assert_eq!(
            sequential.failed.keys().collect::<Vec<_>>(),
            parallel.failed.keys().collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_run_already_registered_entity_fails() {
        let dir = energy_dir();
        let runner = BatchRunner::new(IngestionPipeline::new(IngestionConfig::energy()), 2);
        let mut engine = AggregationEngine::new();

        runner
            .run(specs(dir.path(), Domain::Energy, &[]), &mut engine)
            .await
            .unwrap();
        let second = runner
            .run(specs(dir.path(), Domain::Energy, &[]), &mut engine)
            .await
            .unwrap();

        assert!(second.registered.is_empty());
        assert!(matches!(second.failed["A"], MeterError::DuplicateEntity(_)));
        assert_eq!(engine.len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_all_malformed_is_no_valid_data() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "X.csv", "when,kwh\n2023-01-01,1\n");
        write(dir.path(), "Y.csv", "");
        let runner = BatchRunner::new(IngestionPipeline::new(IngestionConfig::energy()), 2);

        let err = runner
            .ingest(specs(dir.path(), Domain::Energy, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, MeterError::NoValidData { attempted: 2 }));
    }

    #[tokio::test]
    async fn test_weather_run_one_entity_per_metric() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "station.csv",
            "Date,Temperature,Rainfall,Humidity\n2023-01-01,20,,50\n2023-01-02,,4,\n",
        );
        let metrics: Vec<String> = ["Temperature", "Rainfall", "Humidity"]
            .iter()
            .map(|m| m.to_string())
            .collect();
        let runner = BatchRunner::new(IngestionPipeline::new(IngestionConfig::weather()), 3);
        let mut engine = AggregationEngine::new();

        let report = runner
            .run(specs(dir.path(), Domain::Weather, &metrics), &mut engine)
            .await
            .unwrap();

        assert_eq!(
            report.registered,
            vec!["station:Temperature", "station:Rainfall", "station:Humidity"]
        );
        let rain = engine.get("station:Rainfall").unwrap();
        assert_eq!(rain.summary().unwrap().total, 4.0);
        let humidity = engine.get("station:Humidity").unwrap();
        assert_eq!(humidity.summary().unwrap().total, 100.0);
    }
}

//! Data layer for campus meter.
//!
//! Discovers CSV sources, cleans their rows into per-entity series and
//! answers cross-entity aggregation queries.

pub mod engine;
pub mod ingestion;
pub mod reader;
pub mod series;

pub use engine::AggregationEngine;
pub use ingestion::{BatchResult, IngestionConfig, IngestionPipeline, Source};
pub use series::EntitySeries;

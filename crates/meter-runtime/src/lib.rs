//! Runtime layer for campus meter.
//!
//! Runs ingestion across tokio blocking workers and writes exports and
//! reports from a populated engine.

pub mod export;
pub mod runner;

pub use meter_core as core;
pub use meter_data as data;

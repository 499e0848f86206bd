//! Shared types for the campus meter workspace.
//!
//! Readings, summary records, the error taxonomy, timestamp parsing, report
//! formatting and command-line settings live here so that the data and
//! runtime crates agree on one vocabulary.

pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{MeterError, Result, RowParseError};

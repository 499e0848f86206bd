use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the campus meter crates.
#[derive(Error, Debug)]
pub enum MeterError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A delimited file could not be decoded.
    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    /// The header row is missing or lacks a required column.
    ///
    /// Aborts ingestion of one entity, never the whole batch.
    #[error("Schema error in {entity}: {reason}")]
    Schema { entity: String, reason: String },

    /// An aggregation was requested over zero readings.
    #[error("No readings available for {0}")]
    EmptySeries(String),

    /// An entity name was registered twice without a reset.
    #[error("Entity already registered: {0}")]
    DuplicateEntity(String),

    /// Two readings of one entity share a timestamp.
    #[error("Duplicate timestamp {timestamp} in {entity}")]
    DuplicateTimestamp { entity: String, timestamp: String },

    /// A reading value is NaN or infinite.
    #[error("Non-finite value at {timestamp} in {entity}")]
    NonFiniteValue { entity: String, timestamp: String },

    /// Every entity in a batch failed ingestion.
    #[error("No valid data found to process ({attempted} sources attempted)")]
    NoValidData { attempted: usize },

    /// The expected data directory does not exist.
    #[error("Data path not found: {0}")]
    DataPathNotFound(PathBuf),

    /// No CSV files were found under the given directory.
    #[error("No CSV files found in {0}")]
    NoDataFiles(PathBuf),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MeterError {
    /// Shorthand for a [`MeterError::Schema`] on `entity`.
    pub fn schema(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        MeterError::Schema {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// `true` for the variants that abort a single entity rather than a run.
    pub fn is_entity_level(&self) -> bool {
        matches!(
            self,
            MeterError::Schema { .. }
                | MeterError::EmptySeries(_)
                | MeterError::DuplicateEntity(_)
                | MeterError::DuplicateTimestamp { .. }
                | MeterError::NonFiniteValue { .. }
        )
    }
}

/// Convenience alias used throughout the meter crates.
pub type Result<T> = std::result::Result<T, MeterError>;

/// A single input row that could not be turned into a reading.
///
/// Row errors never abort ingestion; they are collected as warnings next to
/// the series that did load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowParseError {
    /// Entity the row belongs to.
    pub entity: String,
    /// 1-based line number within the source, header included.
    pub line: usize,
    /// Human-readable cause.
    pub reason: String,
}

impl RowParseError {
    pub fn new(entity: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            line,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for RowParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} line {}: {}", self.entity, self.line, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = MeterError::FileRead {
            path: PathBuf::from("/data/Library_usage.csv"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/data/Library_usage.csv"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_schema() {
        let err = MeterError::schema("Library", "missing column \"kwh\"");
        assert_eq!(
            err.to_string(),
            "Schema error in Library: missing column \"kwh\""
        );
    }

    #[test]
    fn test_error_display_empty_series() {
        let err = MeterError::EmptySeries("Dormitory_A".to_string());
        assert_eq!(err.to_string(), "No readings available for Dormitory_A");
    }

    #[test]
    fn test_error_display_duplicate_entity() {
        let err = MeterError::DuplicateEntity("Admin_Building".to_string());
        assert_eq!(err.to_string(), "Entity already registered: Admin_Building");
    }

    #[test]
    fn test_error_display_duplicate_timestamp() {
        let err = MeterError::DuplicateTimestamp {
            entity: "Library".to_string(),
            timestamp: "2023-01-01 00:00:00".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate timestamp 2023-01-01 00:00:00 in Library"
        );
    }

    #[test]
    fn test_error_display_non_finite_value() {
        let err = MeterError::NonFiniteValue {
            entity: "Library".to_string(),
            timestamp: "2023-01-01 00:00:00".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Non-finite value at 2023-01-01 00:00:00 in Library"
        );
        assert!(err.is_entity_level());
    }

    #[test]
    fn test_error_display_no_valid_data() {
        let err = MeterError::NoValidData { attempted: 3 };
        assert_eq!(
            err.to_string(),
            "No valid data found to process (3 sources attempted)"
        );
    }

    #[test]
    fn test_error_display_no_data_files() {
        let err = MeterError::NoDataFiles(PathBuf::from("/empty/dir"));
        assert_eq!(err.to_string(), "No CSV files found in /empty/dir");
    }

    #[test]
    fn test_error_display_config() {
        let err = MeterError::Config("unknown fill policy".to_string());
        assert_eq!(err.to_string(), "Configuration error: unknown fill policy");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: MeterError = io_err.into();
        assert!(err.to_string().contains("denied"));
        assert!(!err.is_entity_level());
    }

    #[test]
    fn test_entity_level_classification() {
        assert!(MeterError::schema("x", "y").is_entity_level());
        assert!(MeterError::EmptySeries("x".into()).is_entity_level());
        assert!(MeterError::DuplicateEntity("x".into()).is_entity_level());
        assert!(!MeterError::NoValidData { attempted: 1 }.is_entity_level());
    }

    #[test]
    fn test_row_parse_error_display() {
        let err = RowParseError::new("Library", 7, "value \"abc\" is not numeric");
        assert_eq!(err.to_string(), "Library line 7: value \"abc\" is not numeric");
    }
}

//! CSV source discovery and loading.
//!
//! Files are found recursively under a data directory and named after their
//! file stem. Reading is kept separate from discovery so that each file can
//! be loaded on its own worker and fail on its own.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use meter_core::error::{MeterError, Result};
use meter_core::models::Domain;
use regex::Regex;
use tracing::{debug, warn};

use crate::ingestion::Source;

// ── Discovery ─────────────────────────────────────────────────────────────────

/// Find all `.csv` files recursively under `data_path`, sorted by path.
pub fn find_csv_files(data_path: &Path) -> Result<Vec<PathBuf>> {
    if !data_path.exists() {
        return Err(MeterError::DataPathNotFound(data_path.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable directory entry: {}", e);
                None
            }
        })
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    debug!("Found {} CSV files under {}", files.len(), data_path.display());
    Ok(files)
}

/// Suffix removed from file stems unless configured otherwise.
pub const DEFAULT_ENTITY_SUFFIX: &str = "_usage";

/// Derives entity names from file stems by stripping a fixed suffix.
#[derive(Debug, Clone)]
pub struct EntityNamer {
    suffix: Regex,
}

impl EntityNamer {
    /// `suffix` is matched literally at the end of the stem, e.g. `_usage`.
    pub fn new(suffix: &str) -> Result<Self> {
        let pattern = format!("{}$", regex::escape(suffix));
        let suffix = Regex::new(&pattern)
            .map_err(|e| MeterError::Config(format!("invalid entity suffix {suffix:?}: {e}")))?;
        Ok(Self { suffix })
    }

    /// `Science_Block_usage.csv` → `Science_Block`.
    ///
    /// A stem that is nothing but the suffix keeps its full name.
    pub fn entity_name(&self, path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;
        let stripped = self.suffix.replace(stem, "");
        if stripped.is_empty() {
            Some(stem.to_string())
        } else {
            Some(stripped.into_owned())
        }
    }
}

/// One entity to load: which file, and which value column within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub entity: String,
    pub path: PathBuf,
    /// `None` reads the domain's default value column.
    pub value_field: Option<String>,
}

impl SourceSpec {
    /// Read the file and pair its rows with this entity.
    pub fn load(&self) -> Result<Source> {
        let rows = read_records(&self.path)?;
        let source = Source::new(self.entity.clone(), rows);
        Ok(match &self.value_field {
            Some(field) => source.with_value_field(field.clone()),
            None => source,
        })
    }
}

/// Plan the entities contained in `files`.
///
/// Energy files yield one entity each. Weather files yield one entity per
/// metric, named `<stem>:<metric>`.
pub fn plan_sources(
    files: &[PathBuf],
    domain: Domain,
    namer: &EntityNamer,
    metrics: &[String],
) -> Vec<SourceSpec> {
    let mut specs = Vec::new();
    for path in files {
        let Some(stem) = namer.entity_name(path) else {
            warn!("Skipping file with non UTF-8 name: {}", path.display());
            continue;
        };
        match domain {
            Domain::Energy => specs.push(SourceSpec {
                entity: stem,
                path: path.clone(),
                value_field: None,
            }),
            Domain::Weather => specs.extend(metrics.iter().map(|metric| SourceSpec {
                entity: format!("{stem}:{metric}"),
                path: path.clone(),
                value_field: Some(metric.clone()),
            })),
        }
    }
    specs
}

/// Discover and plan every source under `data_path`.
///
/// Fails when the directory is missing or holds no CSV files.
pub fn discover_sources(
    data_path: &Path,
    domain: Domain,
    namer: &EntityNamer,
    metrics: &[String],
) -> Result<Vec<SourceSpec>> {
    let files = find_csv_files(data_path)?;
    if files.is_empty() {
        return Err(MeterError::NoDataFiles(data_path.to_path_buf()));
    }
    Ok(plan_sources(&files, domain, namer, metrics))
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Read every row of a CSV file, header row included.
///
/// Rows may have differing lengths; cells are trimmed. Header detection is
/// left to the ingestion pipeline.
pub fn read_records(path: &Path) -> Result<Vec<StringRecord>> {
    let file = File::open(path).map_err(|source| MeterError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

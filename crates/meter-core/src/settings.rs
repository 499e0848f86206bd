use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{MeterError, Result};
use crate::models::{Domain, FillPolicy};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Batch aggregation of per-building meter and weather readings
#[derive(Parser, Debug, Clone)]
#[command(
    name = "campus-meter",
    about = "Batch aggregation of per-building meter and weather readings",
    version
)]
pub struct Settings {
    /// Directory scanned recursively for CSV files
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Kind of data being processed
    #[arg(long, default_value = "energy", value_parser = ["energy", "weather"])]
    pub domain: String,

    /// Name of the timestamp column (defaults per domain)
    #[arg(long)]
    pub timestamp_field: Option<String>,

    /// Name of the value column for the energy domain
    #[arg(long)]
    pub value_field: Option<String>,

    /// Metric columns for the weather domain, comma separated
    #[arg(long, value_delimiter = ',')]
    pub metrics: Vec<String>,

    /// Missing-value policy for a column, as COLUMN=mean|zero|ffill|skip
    #[arg(long = "fill")]
    pub fill: Vec<String>,

    /// Suffix stripped from file stems to form entity names
    #[arg(long, default_value = "_usage")]
    pub entity_suffix: String,

    /// Timezone used for offset-bearing timestamps (auto-detected if not specified)
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// Directory receiving exports and the text report
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Maximum number of entities ingested concurrently (1-64)
    #[arg(long, default_value = "4", value_parser = clap::value_parser!(u32).range(1..=64))]
    pub workers: u32,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.campus-meter/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".campus-meter").join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, resolve `"auto"` values, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation – accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            return Self::resolve_auto_values(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins over the persisted value.
        if !is_arg_explicitly_set(&matches, "data_dir") {
            if let Some(v) = last.data_dir {
                settings.data_dir = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "domain") {
            if let Some(v) = last.domain.filter(|d| d.parse::<Domain>().is_ok()) {
                settings.domain = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(v) = last.timezone {
                settings.timezone = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "output_dir") {
            if let Some(v) = last.output_dir {
                settings.output_dir = v;
            }
        }

        settings = Self::resolve_auto_values(settings);

        let params = LastUsedParams::from(&settings);
        let _ = params.save_to(config_path);

        settings
    }

    /// Resolve `"auto"` sentinel values and apply the `--debug` flag.
    fn resolve_auto_values(mut settings: Settings) -> Settings {
        if settings.timezone == "auto" {
            settings.timezone = crate::time_utils::get_system_timezone();
        }
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// The configured [`Domain`].
    pub fn domain(&self) -> Result<Domain> {
        self.domain.parse()
    }

    /// Parse every `--fill COLUMN=POLICY` flag.
    pub fn fill_overrides(&self) -> Result<Vec<(String, FillPolicy)>> {
        self.fill
            .iter()
            .map(|raw| {
                let (column, policy) = raw.split_once('=').ok_or_else(|| {
                    MeterError::Config(format!("--fill expects COLUMN=POLICY, got \"{}\"", raw))
                })?;
                let column = column.trim();
                if column.is_empty() {
                    return Err(MeterError::Config(format!(
                        "--fill has an empty column name in \"{}\"",
                        raw
                    )));
                }
                Ok((column.to_string(), policy.parse()?))
            })
            .collect()
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            data_dir: Some(s.data_dir.clone()),
            domain: Some(s.domain.clone()),
            timezone: Some(s.timezone.clone()),
            output_dir: Some(s.output_dir.clone()),
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

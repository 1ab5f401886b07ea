//! `reqprof.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use time::UtcOffset;
use time::macros::format_description;

use crate::{ReqprofError, ReqprofResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Base directory for the profile database and runtime artifacts.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Reference UTC offset used for all month bucketing, e.g. "+10:00".
    /// Pinned for the whole system so two timestamps in the same calendar
    /// month always land in the same bucket.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,

    /// Months of page-group history to retain. Unset disables purging
    /// entirely; this is a policy, not a missing-config error.
    #[serde(default)]
    pub retention_months: Option<u32>,

    /// Identifiers deleted per statement when purging or repairing, so a
    /// large backlog never produces one oversized delete.
    #[serde(default = "default_purge_batch_size")]
    pub purge_batch_size: usize,

    /// Default reporter for CLI commands.
    #[serde(default = "default_reporter")]
    pub reporter: Reporter,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".reqprof")
}

fn default_utc_offset() -> String {
    "+00:00".to_string()
}

fn default_purge_batch_size() -> usize {
    1000
}

fn default_reporter() -> Reporter {
    Reporter::Pretty
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            utc_offset: default_utc_offset(),
            retention_months: None,
            purge_batch_size: default_purge_batch_size(),
            reporter: default_reporter(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.base_dir.join("profiles.db")
    }

    /// Parse the configured reference offset once; callers thread the result
    /// through rather than re-deriving it per conversion.
    pub fn reference_offset(&self) -> ReqprofResult<UtcOffset> {
        let format = format_description!("[offset_hour sign:mandatory]:[offset_minute]");
        UtcOffset::parse(&self.utc_offset, format).map_err(|err| {
            ReqprofError::Config(format!(
                "invalid utc_offset {:?} (expected e.g. \"+10:00\"): {err}",
                self.utc_offset
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reporter {
    Pretty,
    Json,
}

impl clap::ValueEnum for Reporter {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Pretty, Self::Json]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Pretty => clap::builder::PossibleValue::new("pretty"),
            Self::Json => clap::builder::PossibleValue::new("json"),
        })
    }
}

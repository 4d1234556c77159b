//! Operator configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML file,
//! `QUESTLINE__*` environment variables (`__` separates nested keys, e.g.
//! `QUESTLINE__ENGINE__CALL_DELAY_MS`). Command-line flags are applied last
//! by the caller.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use questline_engine::EngineConfig;
use questline_source::SourceConfig;

const ENV_PREFIX: &str = "QUESTLINE";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory for the progress database.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "questline_engine=debug").
    pub log_level: String,
    /// "text" or "json".
    pub log_format: String,
    pub source: SourceConfig,
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("questline");

        Self {
            data_dir,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            source: SourceConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `file` (if given) and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&AppConfig::default())
            .context("failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Path to the RocksDB progress database.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("progress")
    }
}

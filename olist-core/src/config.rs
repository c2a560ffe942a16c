//! Configuration system for the warehouse pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace `olist.toml` -> explicit file -> environment (`OLIST_` prefix).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{EtlError, Result};
use crate::staging::{STAGING_TABLES, StagingTable};

/// Workspace-level config file name.
pub const WORKSPACE_CONFIG_FILE: &str = "olist.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Directory holding the raw CSV extracts.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Extract file name per staging source (e.g. `raw_orders`).
    #[serde(default = "default_sources")]
    pub sources: BTreeMap<String, String>,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: DatabaseConfig::default(),
            sources: default_sources(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl WarehouseConfig {
    /// Resolve the extract path for a staging table.
    ///
    /// Falls back to the table's default file name when the source map has no entry.
    pub fn source_path(&self, table: &StagingTable) -> PathBuf {
        let file = self
            .sources
            .get(table.source)
            .map(String::as_str)
            .unwrap_or(table.default_file);
        self.data_dir.join(file)
    }

    /// Resolve relative paths against a workspace directory.
    pub fn resolve_paths(mut self, workspace: &Path) -> Self {
        if self.data_dir.is_relative() {
            self.data_dir = workspace.join(&self.data_dir);
        }
        if self.database.path.is_relative() {
            self.database.path = workspace.join(&self.database.path);
        }
        if self.monitoring.output_dir.is_relative() {
            self.monitoring.output_dir = workspace.join(&self.monitoring.output_dir);
        }
        self
    }

    /// Reject settings no run could use.
    pub fn validate(&self) -> Result<()> {
        if self.monitoring.histogram_bins == 0 {
            return Err(EtlError::invalid_input(
                "monitoring.histogram_bins must be at least 1",
            ));
        }
        let tolerance = self.monitoring.payment_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(EtlError::invalid_input(format!(
                "monitoring.payment_tolerance must be a non-negative number, got {tolerance}"
            )));
        }
        if let Some(source) = self.sources.keys().find(|k| {
            !STAGING_TABLES.iter().any(|t| t.source == k.as_str())
        }) {
            return Err(EtlError::invalid_input(format!(
                "sources.{source} does not name a staging source"
            )));
        }
        Ok(())
    }
}

/// Warehouse store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite warehouse file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    /// How long a connection waits on a locked database (milliseconds).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Data-quality monitoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Root directory for report artifacts (`csv/` and `plots/` live below it).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Number of bins in the lead-time histogram.
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
    /// Evaluate rules concurrently on read-only connections.
    #[serde(default = "default_true")]
    pub concurrent: bool,
    /// Allowed absolute difference between payments and item totals per order.
    #[serde(default = "default_payment_tolerance")]
    pub payment_tolerance: f64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            histogram_bins: default_histogram_bins(),
            concurrent: true,
            payment_tolerance: default_payment_tolerance(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("olist.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("monitoring")
}

fn default_histogram_bins() -> usize {
    30
}

fn default_payment_tolerance() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_sources() -> BTreeMap<String, String> {
    STAGING_TABLES
        .iter()
        .map(|t| (t.source.to_string(), t.default_file.to_string()))
        .collect()
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `OLIST_`, nested keys split on `__`)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`olist.toml`)
/// 4. User config (`~/.config/olist/config.toml`)
/// 5. Built-in defaults
///
/// The merged result is validated before it is returned.
pub fn load_config(workspace: Option<&Path>, explicit: Option<&Path>) -> Result<WarehouseConfig> {
    let mut figment = Figment::from(Serialized::defaults(WarehouseConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "olist", "olist") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_CONFIG_FILE);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    // OLIST_DATA_DIR, OLIST_DATABASE__PATH, OLIST_MONITORING__CONCURRENT, ...
    figment = figment.merge(Env::prefixed("OLIST_").split("__"));

    let config: WarehouseConfig = figment
        .extract()
        .map_err(|e| EtlError::config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

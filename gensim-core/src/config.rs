//! Configuration for the gensim kernel.
//!
//! Maps directly to `gensim.toml`. Every section and field has a default, so
//! an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::walk::TerrainKind;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GensimConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// World clock and global entities.
    #[serde(default)]
    pub world: WorldConfig,
    /// Path finder settings.
    #[serde(default)]
    pub walk: WalkConfig,
    /// Terrain quality multipliers.
    #[serde(default)]
    pub terrain: TerrainConfig,
    /// Persistence / save settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Performance budget monitoring.
    #[serde(default)]
    pub performance: PerformanceConfig,
}

impl GensimConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `GensimError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::GensimError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seed for the weighted effect draw. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            seed: None,
        }
    }
}

/// World clock and the character that owns global stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Name of the character whose stats are world-global.
    #[serde(default = "default_global_character")]
    pub global_character: String,
    /// Label of the global stat holding the clock (Unix seconds).
    #[serde(default = "default_time_label")]
    pub time_label: String,
    /// Calendar date the world clock starts at (`YYYY-MM-DD`, UTC).
    #[serde(default = "default_start_date")]
    pub start_date: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            global_character: "Alice Liddell".to_string(),
            time_label: "time".to_string(),
            start_date: "2022-01-01".to_string(),
        }
    }
}

impl WorldConfig {
    /// Unix timestamp of `start_date` at midnight UTC.
    ///
    /// # Errors
    /// Returns `GensimError::Config` if the date does not parse.
    pub fn start_timestamp(&self) -> crate::error::Result<i64> {
        let date = chrono::NaiveDate::parse_from_str(&self.start_date, "%Y-%m-%d")
            .map_err(|e| crate::GensimError::Config(format!("start_date: {e}")))?;
        Ok(date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp())
    }
}

/// Path finder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkConfig {
    /// Memo cache entries kept; `0` means unbounded.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Longest route (in hops) a search may explore.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 10_000,
            max_depth: 64,
        }
    }
}

/// Terrain quality multipliers (time and energy per unit distance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainConfig {
    /// Rivers are slow to cross.
    #[serde(default = "default_river")]
    pub river: f64,
    /// Mountain trails.
    #[serde(default = "default_mountain")]
    pub mountain: f64,
    /// Forest tracks.
    #[serde(default = "default_forest")]
    pub forest: f64,
    /// Open grasslands.
    #[serde(default = "default_grasslands")]
    pub grasslands: f64,
    /// Streets and roads.
    #[serde(default = "default_urban")]
    pub urban: f64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            river: 5.0,
            mountain: 2.0,
            forest: 3.0,
            grasslands: 1.0,
            urban: 0.7,
        }
    }
}

impl TerrainConfig {
    /// Quality multiplier configured for `kind`.
    #[must_use]
    pub fn quality(&self, kind: TerrainKind) -> f64 {
        match kind {
            TerrainKind::River => self.river,
            TerrainKind::Mountain => self.mountain,
            TerrainKind::Forest => self.forest,
            TerrainKind::Grasslands => self.grasslands,
            TerrainKind::Urban => self.urban,
        }
    }
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Number of save backups to keep.
    #[serde(default = "default_3")]
    pub backup_count: u32,
    /// Detect save corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            backup_count: 3,
            checksum_enabled: true,
        }
    }
}

/// Performance budget monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// A trigger pass slower than this is logged.
    #[serde(default = "default_tick_budget")]
    pub tick_budget_ms: f64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            tick_budget_ms: 300.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_global_character() -> String { "Alice Liddell".to_string() }
fn default_time_label() -> String { "time".to_string() }
fn default_start_date() -> String { "2022-01-01".to_string() }
fn default_cache_capacity() -> usize { 10_000 }
fn default_max_depth() -> usize { 64 }
fn default_river() -> f64 { 5.0 }
fn default_mountain() -> f64 { 2.0 }
fn default_forest() -> f64 { 3.0 }
fn default_grasslands() -> f64 { 1.0 }
fn default_urban() -> f64 { 0.7 }
fn default_3() -> u32 { 3 }
fn default_tick_budget() -> f64 { 300.0 }

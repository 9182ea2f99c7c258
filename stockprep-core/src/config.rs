//! Pipeline configuration.
//!
//! Stored as an optional TOML file. Every field has a default, so an empty
//! file (or no file at all) gives the well-known artifact paths:
//!
//! ```toml
//! [paths]
//! raw = "stock_market.csv"
//! canonical = "cleaned.parquet"
//! daily_close = "agg1_daily_close.parquet"
//! sector_volume = "agg2_sector_volume.parquet"
//! daily_returns = "agg3_daily_returns.parquet"
//!
//! [cleaning]
//! header_collision = "keep_last"   # or "reject"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::data::canonicalize::CollisionPolicy;
use crate::views::ViewKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Artifact locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw: PathBuf,
    pub canonical: PathBuf,
    pub daily_close: PathBuf,
    pub sector_volume: PathBuf,
    pub daily_returns: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw: PathBuf::from("stock_market.csv"),
            canonical: PathBuf::from("cleaned.parquet"),
            daily_close: PathBuf::from("agg1_daily_close.parquet"),
            sector_volume: PathBuf::from("agg2_sector_volume.parquet"),
            daily_returns: PathBuf::from("agg3_daily_returns.parquet"),
        }
    }
}

impl PathsConfig {
    pub fn view_path(&self, kind: ViewKind) -> &Path {
        match kind {
            ViewKind::DailyClose => &self.daily_close,
            ViewKind::SectorVolume => &self.sector_volume,
            ViewKind::DailyReturns => &self.daily_returns,
        }
    }

    /// Move the three view artifacts into `dir`, keeping their file names.
    pub fn place_views_in(&mut self, dir: &Path) {
        for path in [&mut self.daily_close, &mut self.sector_volume, &mut self.daily_returns] {
            if let Some(name) = path.file_name() {
                *path = dir.join(name);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub header_collision: CollisionPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub cleaning: CleaningConfig,
}

impl PipelineConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

//! Map generator configuration.
//!
//! Loaded from a TOML file; every field has a default so partial files work.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use voxmap_common::{SchemaConfig, SchemaError};

/// Configuration file name.
pub const CONFIG_FILE: &str = "voxmap.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid TOML for this structure
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The schema table describes an impossible schema
    #[error("Invalid schema: {0}")]
    Schema(#[from] SchemaError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Block and biome encoding settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaSettings {
    /// Use 16-bit biome ids
    pub extended_biomes: bool,
    /// Use 20-bit block ids and wide metadata
    pub extended_blocks: bool,
    /// Block id count (extended blocks only)
    pub block_id_count: u32,
    /// Metadata width in bits (extended blocks only)
    pub bits_per_metadata: u32,
    /// Biome id count (extended biomes only)
    pub biome_count: u32,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            extended_biomes: false,
            extended_blocks: false,
            block_id_count: 4096,
            bits_per_metadata: 4,
            biome_count: 256,
        }
    }
}

/// Map generator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Chunks examined per surface tick
    pub chunks_per_tick: usize,
    /// Squared chunk distance within which chunks are rendered and saved
    pub max_chunk_save_dist_sq: i64,
    /// Persist viewed chunks in single player
    pub region_file_output_enabled_sp: bool,
    /// Persist viewed chunks in multiplayer
    pub region_file_output_enabled_mp: bool,
    /// Background worker threads
    pub worker_threads: usize,
    /// Directory of stored chunks
    pub region_dir: PathBuf,
    /// Block colour file loaded at startup
    pub colour_file: Option<PathBuf>,
    /// Block and biome encoding
    pub schema: SchemaSettings,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            chunks_per_tick: 30,
            max_chunk_save_dist_sq: 64,
            region_file_output_enabled_sp: true,
            region_file_output_enabled_mp: true,
            worker_threads: 1,
            region_dir: PathBuf::from("voxmap/regions"),
            colour_file: None,
            schema: SchemaSettings::default(),
        }
    }
}

impl MapConfig {
    /// Loads configuration from `path`.
    /// Returns defaults if the file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match Self::try_load_from(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to load config file: {e}");
                Self::default()
            },
        }
    }

    /// Loads and validates configuration from `path`, reporting failures.
    pub fn try_load_from<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        config.validate();
        Ok(config)
    }

    /// Saves configuration to `path`, creating parent directories.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamps values to sensible ranges.
    pub fn validate(&mut self) {
        self.chunks_per_tick = self.chunks_per_tick.clamp(1, 1024);
        self.max_chunk_save_dist_sq = self.max_chunk_save_dist_sq.max(0);
        self.worker_threads = self.worker_threads.clamp(1, 16);
    }

    /// Whether viewed chunks are persisted in the given session kind.
    #[must_use]
    pub const fn region_output_enabled(&self, multiplayer: bool) -> bool {
        if multiplayer {
            self.region_file_output_enabled_mp
        } else {
            self.region_file_output_enabled_sp
        }
    }

    /// Builds the schema described by the `schema` table.
    pub fn schema_config(&self) -> ConfigResult<SchemaConfig> {
        let s = &self.schema;
        if !s.extended_biomes && !s.extended_blocks {
            return Ok(SchemaConfig::vanilla());
        }
        Ok(SchemaConfig::extended(
            s.extended_biomes,
            s.extended_blocks,
            s.block_id_count,
            s.bits_per_metadata,
            s.biome_count,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = MapConfig::default();
        assert_eq!(config.chunks_per_tick, 30);
        assert_eq!(config.max_chunk_save_dist_sq, 64);
        assert!(config.region_output_enabled(false));
        assert!(config.region_output_enabled(true));
        assert_eq!(config.worker_threads, 1);
        assert_eq!(config.schema_config().expect("vanilla"), SchemaConfig::vanilla());
    }

    #[test]
    fn test_config_validation() {
        let mut config = MapConfig {
            chunks_per_tick: 0,
            worker_threads: 99,
            max_chunk_save_dist_sq: -5,
            ..MapConfig::default()
        };
        config.validate();
        assert_eq!(config.chunks_per_tick, 1);
        assert_eq!(config.worker_threads, 16);
        assert_eq!(config.max_chunk_save_dist_sq, 0);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested/voxmap.toml");

        let mut config = MapConfig::default();
        config.chunks_per_tick = 8;
        config.region_file_output_enabled_mp = false;
        config.colour_file = Some(PathBuf::from("colours.txt"));
        config.schema.extended_blocks = true;
        config.schema.block_id_count = 1 << 16;
        config.schema.bits_per_metadata = 8;

        config.save_to(&config_path).expect("Failed to save config");
        let loaded = MapConfig::load_from(&config_path);
        assert_eq!(loaded, config);
        assert!(!loaded.region_output_enabled(true));

        let schema = loaded.schema_config().expect("valid schema");
        assert!(schema.extended_blocks());
        assert_eq!(schema.meta_count(), 256);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "chunks_per_tick = 5\n[schema]\nextended_biomes = true\nbiome_count = 1024\n")
            .expect("write");

        let config = MapConfig::load_from(&path);
        assert_eq!(config.chunks_per_tick, 5);
        assert_eq!(config.worker_threads, 1);
        let schema = config.schema_config().expect("valid schema");
        assert!(schema.extended_biomes());
        assert!(!schema.extended_blocks());
        assert_eq!(schema.biome_count(), 1024);
    }

    #[test]
    fn test_config_load_missing_or_invalid() {
        let config = MapConfig::load_from("/nonexistent/path/voxmap.toml");
        assert_eq!(config, MapConfig::default());

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "chunks_per_tick = \"many\"").expect("write");
        assert_eq!(MapConfig::load_from(&path), MapConfig::default());
        assert!(matches!(MapConfig::try_load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_bad_schema_is_reported() {
        let mut config = MapConfig::default();
        config.schema.extended_blocks = true;
        config.schema.bits_per_metadata = 20;
        assert!(matches!(config.schema_config(), Err(ConfigError::Schema(_))));
    }
}

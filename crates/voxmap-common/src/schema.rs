//! Schema capability flags.
//!
//! Selects between the vanilla encoding (12-bit block ids, 4-bit metadata,
//! one byte per biome) and the extended encoding (20-bit block ids, 12-bit
//! metadata, two bytes per biome). The biome and block halves are chosen
//! independently.
//!
//! A [`SchemaConfig`] is a small `Copy` value handed to every constructor
//! that needs it. The process-wide copy behind [`SchemaConfig::install`]
//! and [`SchemaConfig::active`] exists only for entry points that cannot
//! thread a value through.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{SchemaError, SchemaResult};

/// Block id count of the vanilla schema.
pub const VANILLA_BLOCK_ID_COUNT: u32 = 4096;

/// Metadata value count of the vanilla schema.
pub const VANILLA_META_COUNT: u32 = 16;

/// Biome id count of the vanilla schema.
pub const VANILLA_BIOME_COUNT: u32 = 256;

/// Largest block id count the extended schema can encode (20 bits).
pub const MAX_EXTENDED_BLOCK_ID_COUNT: u32 = 1 << 20;

/// Largest metadata width the extended schema can encode.
pub const MAX_BITS_PER_METADATA: u32 = 12;

/// Largest biome id count the extended schema can encode (16 bits).
pub const MAX_EXTENDED_BIOME_COUNT: u32 = 1 << 16;

static ACTIVE: OnceCell<SchemaConfig> = OnceCell::new();

/// Immutable capability flags and derived counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaConfig {
    extended_biomes: bool,
    extended_blocks: bool,
    block_id_count: u32,
    meta_count: u32,
    biome_count: u32,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self::vanilla()
    }
}

impl SchemaConfig {
    /// The vanilla schema for both blocks and biomes.
    #[must_use]
    pub const fn vanilla() -> Self {
        Self {
            extended_biomes: false,
            extended_blocks: false,
            block_id_count: VANILLA_BLOCK_ID_COUNT,
            meta_count: VANILLA_META_COUNT,
            biome_count: VANILLA_BIOME_COUNT,
        }
    }

    /// Builds a schema with the extended encodings switched on as requested.
    ///
    /// Counters for a half that stays vanilla are ignored and replaced by
    /// the vanilla values.
    pub fn extended(
        extended_biomes: bool,
        extended_blocks: bool,
        block_id_count: u32,
        bits_per_metadata: u32,
        biome_count: u32,
    ) -> SchemaResult<Self> {
        let mut schema = Self::vanilla();

        if extended_blocks {
            check_count("block_id_count", block_id_count, MAX_EXTENDED_BLOCK_ID_COUNT)?;
            if bits_per_metadata == 0 || bits_per_metadata > MAX_BITS_PER_METADATA {
                return Err(SchemaError::CountOutOfRange {
                    name: "bits_per_metadata",
                    value: bits_per_metadata,
                    max: MAX_BITS_PER_METADATA,
                });
            }
            schema.extended_blocks = true;
            schema.block_id_count = block_id_count;
            schema.meta_count = 1 << bits_per_metadata;
        }

        if extended_biomes {
            check_count("biome_count", biome_count, MAX_EXTENDED_BIOME_COUNT)?;
            // Biome ids wrap with `id & (biome_count - 1)`.
            if !biome_count.is_power_of_two() {
                return Err(SchemaError::NotPowerOfTwo {
                    name: "biome_count",
                    value: biome_count,
                });
            }
            schema.extended_biomes = true;
            schema.biome_count = biome_count;
        }

        Ok(schema)
    }

    /// Whether biome arrays use 16-bit cells.
    #[must_use]
    pub const fn extended_biomes(&self) -> bool {
        self.extended_biomes
    }

    /// Whether block storage uses the 20-bit id / 12-bit meta planes.
    #[must_use]
    pub const fn extended_blocks(&self) -> bool {
        self.extended_blocks
    }

    /// Number of addressable block ids.
    #[must_use]
    pub const fn block_id_count(&self) -> u32 {
        self.block_id_count
    }

    /// Number of addressable metadata values.
    #[must_use]
    pub const fn meta_count(&self) -> u32 {
        self.meta_count
    }

    /// Number of biome ids, a power of two; sizes the biome multiplier tables.
    #[must_use]
    pub const fn biome_count(&self) -> u32 {
        self.biome_count
    }

    /// Installs the process-wide schema. Only the first call succeeds.
    pub fn install(self) -> SchemaResult<()> {
        ACTIVE.set(self).map_err(|_| SchemaError::AlreadyInstalled)?;
        info!(
            extended_biomes = self.extended_biomes,
            extended_blocks = self.extended_blocks,
            block_id_count = self.block_id_count,
            meta_count = self.meta_count,
            biome_count = self.biome_count,
            "installed schema capability flags"
        );
        Ok(())
    }

    /// The installed process-wide schema, or vanilla if none was installed.
    #[must_use]
    pub fn active() -> Self {
        ACTIVE.get().copied().unwrap_or_default()
    }
}

fn check_count(name: &'static str, value: u32, max: u32) -> SchemaResult<()> {
    if value == 0 || value > max {
        return Err(SchemaError::CountOutOfRange { name, value, max });
    }
    Ok(())
}

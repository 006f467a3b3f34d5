//! Per-column biome ids.

use voxmap_common::{SchemaConfig, COLUMNS_PER_CHUNK};
use voxmap_nbt::{Compound, Tag};

use crate::error::RegionResult;
use crate::host::HostChunk;
use crate::tags;

/// Tag holding one byte per column.
pub const BIOMES_TAG: &str = "Biomes";

/// Tag holding two little-endian bytes per column.
pub const BIOMES16_TAG: &str = "Biomes16v2";

/// Biome ids of the 256 columns of a chunk, indexed by `(z << 4) | x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiomeStorage {
    /// 8-bit biome ids
    Vanilla(Box<[u8; COLUMNS_PER_CHUNK]>),
    /// 16-bit biome ids
    Extended(Box<[u16; COLUMNS_PER_CHUNK]>),
}

impl BiomeStorage {
    /// All-zero storage of the variant `schema` selects.
    #[must_use]
    pub fn empty(schema: &SchemaConfig) -> Self {
        if schema.extended_biomes() {
            Self::Extended(Box::new([0; COLUMNS_PER_CHUNK]))
        } else {
            Self::Vanilla(Box::new([0; COLUMNS_PER_CHUNK]))
        }
    }

    /// Biome id of a column; 0 past the end of the array.
    #[inline]
    #[must_use]
    pub fn biome_at(&self, offset: usize) -> u32 {
        match self {
            Self::Vanilla(cells) => cells.get(offset).map_or(0, |&b| u32::from(b)),
            Self::Extended(cells) => cells.get(offset).map_or(0, |&b| u32::from(b)),
        }
    }

    /// Writes the biome tag of this variant into `compound`.
    pub fn serialize(&self, compound: &mut Compound) {
        match self {
            Self::Vanilla(cells) => {
                compound.insert(BIOMES_TAG.into(), Tag::ByteArray(cells.to_vec()));
            }
            Self::Extended(cells) => {
                let bytes = cells.iter().flat_map(|v| v.to_le_bytes()).collect();
                compound.insert(BIOMES16_TAG.into(), Tag::ByteArray(bytes));
            }
        }
    }

    /// Copies the biome array of a host chunk.
    ///
    /// An extended storage accepts a byte-per-column host and widens it.
    #[must_use]
    pub fn clone_from_host<H: HostChunk + ?Sized>(host: &H, schema: &SchemaConfig) -> Self {
        let mut storage = Self::empty(schema);
        match &mut storage {
            Self::Vanilla(cells) => {
                if let Some(src) = host.biome_bytes() {
                    copy_prefix(cells.as_mut_slice(), src);
                }
            }
            Self::Extended(cells) => {
                if let Some(src) = host.biome_shorts() {
                    copy_prefix(cells.as_mut_slice(), src);
                } else if let Some(src) = host.biome_bytes() {
                    widen(cells, src);
                }
            }
        }
        storage
    }

    /// Reads biomes from a stored chunk compound.
    ///
    /// Short arrays leave the remaining columns at biome 0. An extended
    /// storage falls back to the byte-per-column tag when the wide tag is
    /// absent.
    pub fn deserialize(compound: &Compound, schema: &SchemaConfig) -> RegionResult<Self> {
        let mut storage = Self::empty(schema);
        match &mut storage {
            Self::Vanilla(cells) => {
                if let Some(src) = tags::byte_array(compound, BIOMES_TAG)? {
                    copy_prefix(cells.as_mut_slice(), src);
                }
            }
            Self::Extended(cells) => {
                if let Some(src) = tags::byte_array(compound, BIOMES16_TAG)? {
                    for (cell, pair) in cells.iter_mut().zip(src.chunks_exact(2)) {
                        *cell = u16::from_le_bytes([pair[0], pair[1]]);
                    }
                } else if let Some(src) = tags::byte_array(compound, BIOMES_TAG)? {
                    widen(cells, src);
                }
            }
        }
        Ok(storage)
    }

    /// Whether the storage uses 16-bit ids.
    #[must_use]
    pub const fn is_extended(&self) -> bool {
        matches!(self, Self::Extended(_))
    }
}

fn copy_prefix<T: Copy>(dst: &mut [T], src: &[T]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
}

fn widen(dst: &mut [u16; COLUMNS_PER_CHUNK], src: &[u8]) {
    for (cell, &b) in dst.iter_mut().zip(src) {
        *cell = u16::from(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryChunk;
    use voxmap_common::ChunkPos;

    fn extended_biomes() -> SchemaConfig {
        SchemaConfig::extended(true, false, 0, 0, 4096).expect("schema")
    }

    #[test]
    fn test_vanilla_round_trip() {
        let mut host = MemoryChunk::new(ChunkPos::new(0, 0, 0), SchemaConfig::vanilla());
        host.set_biome(15, 15, 200);
        let storage = BiomeStorage::clone_from_host(&host, &SchemaConfig::vanilla());
        assert_eq!(storage.biome_at(255), 200);
        assert_eq!(storage.biome_at(256), 0);

        let mut compound = Compound::new();
        storage.serialize(&mut compound);
        assert_eq!(compound[BIOMES_TAG].as_byte_array().map(<[u8]>::len), Some(256));

        let decoded = BiomeStorage::deserialize(&compound, &SchemaConfig::vanilla())
            .expect("decode");
        assert_eq!(decoded, storage);
    }

    #[test]
    fn test_extended_is_little_endian() {
        let schema = extended_biomes();
        let mut host = MemoryChunk::new(ChunkPos::new(0, 0, 0), schema);
        host.set_biome(1, 0, 0x1234);
        let storage = BiomeStorage::clone_from_host(&host, &schema);

        let mut compound = Compound::new();
        storage.serialize(&mut compound);
        assert!(!compound.contains_key(BIOMES_TAG));
        let bytes = compound[BIOMES16_TAG].as_byte_array().expect("wide tag");
        assert_eq!(bytes.len(), 512);
        assert_eq!(&bytes[2..4], &[0x34, 0x12]);

        let decoded = BiomeStorage::deserialize(&compound, &schema).expect("decode");
        assert_eq!(decoded.biome_at(1), 0x1234);
    }

    #[test]
    fn test_legacy_upgrade_path() {
        let mut compound = Compound::new();
        compound.insert(BIOMES_TAG.into(), Tag::ByteArray((0..=255).collect()));
        let storage = BiomeStorage::deserialize(&compound, &extended_biomes()).expect("decode");
        assert!(storage.is_extended());
        for offset in 0..256 {
            assert_eq!(storage.biome_at(offset), offset as u32 & 0xFF);
        }
    }

    #[test]
    fn test_short_and_missing_arrays() {
        let mut compound = Compound::new();
        compound.insert(BIOMES_TAG.into(), Tag::ByteArray(vec![7; 10]));
        let storage = BiomeStorage::deserialize(&compound, &SchemaConfig::vanilla()).expect("decode");
        assert_eq!(storage.biome_at(9), 7);
        assert_eq!(storage.biome_at(10), 0);

        let empty = BiomeStorage::deserialize(&Compound::new(), &extended_biomes()).expect("decode");
        assert_eq!(empty.biome_at(0), 0);
    }

    #[test]
    fn test_wrong_tag_type_is_error() {
        let mut compound = Compound::new();
        compound.insert(BIOMES_TAG.into(), Tag::Int(1));
        assert!(BiomeStorage::deserialize(&compound, &SchemaConfig::vanilla()).is_err());
    }

    #[test]
    fn test_variant_follows_biome_flag_only() {
        let blocks_only = SchemaConfig::extended(false, true, 1 << 16, 8, 0).expect("schema");
        assert!(!BiomeStorage::empty(&blocks_only).is_extended());
        assert!(BiomeStorage::empty(&extended_biomes()).is_extended());
    }
}

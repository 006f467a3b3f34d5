//! Immutable chunk snapshots and their stored encoding.
//!
//! A snapshot is a deep copy of everything the map needs from a host chunk.
//! It owns all its buffers, so it can cross to worker threads while the
//! host keeps mutating the live chunk.
//!
//! The stored form is an NBT tree:
//!
//! ```text
//! "" {
//!   Level {
//!     xPos, zPos        Int
//!     Sections          [ { Y, Blocks, Add, ..., Data, BlockLight } ]
//!     Biomes | Biomes16v2
//!     TileEntities      [ { x, y, z, ... } ]
//!   }
//! }
//! ```

use std::io::Cursor;
use std::sync::Arc;

use tracing::warn;
use voxmap_common::{ChunkPos, LocalPos, SchemaConfig};
use voxmap_nbt::{Compound, NbtFile, Tag};

use crate::biome::BiomeStorage;
use crate::blocks::{self, BlockStorage, SECTIONS_TAG, Y_TAG};
use crate::error::{RegionError, RegionResult};
use crate::host::{HostChunk, Plane, TileEntityMap};
use crate::packed::{copy_plane, empty_planes, fetch_safe_nibble, Planes};
use crate::tags;

const LEVEL_TAG: &str = "Level";
const BLOCK_LIGHT_TAG: &str = "BlockLight";
const TILE_ENTITIES_TAG: &str = "TileEntities";

/// Deep copy of a host chunk.
#[derive(Debug, Clone)]
pub struct ChunkSnapshot {
    pos: ChunkPos,
    blocks: BlockStorage,
    biomes: BiomeStorage,
    block_light: Planes,
    tile_entities: TileEntityMap,
}

impl ChunkSnapshot {
    /// Copies a host chunk. No buffer of the host is shared afterwards,
    /// except the opaque tile entity payloads.
    #[must_use]
    pub fn capture<H: HostChunk + ?Sized>(host: &H, schema: &SchemaConfig) -> Self {
        let mut block_light = empty_planes();
        for (sub, plane) in block_light.iter_mut().enumerate() {
            *plane = copy_plane(host.plane(sub, Plane::BlockLight));
        }
        Self {
            pos: host.pos(),
            blocks: BlockStorage::clone_from_host(host, schema),
            biomes: BiomeStorage::clone_from_host(host, schema),
            block_light,
            tile_entities: host.tile_entities().clone(),
        }
    }

    /// Chunk position.
    #[must_use]
    pub const fn pos(&self) -> ChunkPos {
        self.pos
    }

    /// Block storage.
    #[must_use]
    pub const fn blocks(&self) -> &BlockStorage {
        &self.blocks
    }

    /// Biome storage.
    #[must_use]
    pub const fn biomes(&self) -> &BiomeStorage {
        &self.biomes
    }

    /// Block id at `(sub, off)`.
    #[must_use]
    pub fn id_at(&self, sub: usize, off: usize) -> u32 {
        self.blocks.id_at(sub, off)
    }

    /// Metadata at `(sub, off)`.
    #[must_use]
    pub fn meta_at(&self, sub: usize, off: usize) -> u32 {
        self.blocks.meta_at(sub, off)
    }

    /// Packed `(meta << 32) | id` key at `(sub, off)`.
    #[must_use]
    pub fn block_and_meta_at(&self, sub: usize, off: usize) -> u64 {
        (u64::from(self.meta_at(sub, off)) << 32) | u64::from(self.id_at(sub, off))
    }

    /// Biome of column `offset`.
    #[must_use]
    pub fn biome_at(&self, offset: usize) -> u32 {
        self.biomes.biome_at(offset)
    }

    /// Block light at `(sub, off)`.
    #[must_use]
    pub fn block_light_at(&self, sub: usize, off: usize) -> u32 {
        fetch_safe_nibble(&self.block_light, sub, off)
    }

    /// Whether sub-chunk `sub` is present.
    #[must_use]
    pub fn has_sub_chunk(&self, sub: usize) -> bool {
        self.blocks.has_sub_chunk(sub)
    }

    /// Tile entities keyed by local position.
    #[must_use]
    pub const fn tile_entities(&self) -> &TileEntityMap {
        &self.tile_entities
    }

    /// Builds the stored NBT tree.
    #[must_use]
    pub fn to_nbt(&self) -> NbtFile {
        let mut level = Compound::new();
        level.insert("xPos".into(), Tag::Int(self.pos.x));
        level.insert("zPos".into(), Tag::Int(self.pos.z));

        self.blocks.serialize(&mut level);
        if let Some(Tag::List(sections)) = level.get_mut(SECTIONS_TAG) {
            for section in sections.iter_mut().filter_map(Tag::as_compound_mut) {
                let Some(Tag::Byte(y)) = section.get(Y_TAG) else {
                    continue;
                };
                if let Some(light) = self.block_light.get(*y as usize).and_then(Option::as_ref) {
                    section.insert(BLOCK_LIGHT_TAG.into(), Tag::ByteArray(light.clone()));
                }
            }
        }

        self.biomes.serialize(&mut level);

        let mut entities: Vec<_> = self.tile_entities.iter().collect();
        entities.sort_by_key(|(pos, _)| **pos);
        let list = entities
            .into_iter()
            .map(|(pos, tag)| {
                let mut tag = Tag::clone(tag);
                if let Some(compound) = tag.as_compound_mut() {
                    let (x, y, z) = pos.to_world(self.pos);
                    compound.insert("x".into(), Tag::Int(x));
                    compound.insert("y".into(), Tag::Int(y));
                    compound.insert("z".into(), Tag::Int(z));
                }
                tag
            })
            .collect();
        level.insert(TILE_ENTITIES_TAG.into(), Tag::List(list));

        let mut root = Compound::new();
        root.insert(LEVEL_TAG.into(), Tag::Compound(level));
        NbtFile::new(String::new(), Tag::Compound(root))
    }

    /// Rebuilds a snapshot from its stored NBT tree.
    ///
    /// The dimension is not stored and comes from the caller.
    pub fn from_nbt(file: &NbtFile, dim: i32, schema: &SchemaConfig) -> RegionResult<Self> {
        let root = file.compound().ok_or(RegionError::WrongTagType {
            name: "root",
            expected: "TAG_Compound",
            found: file.root.type_name(),
        })?;
        let level = tags::compound(root, LEVEL_TAG)?.ok_or(RegionError::MissingTag(LEVEL_TAG))?;
        let x = tags::int(level, "xPos")?.ok_or(RegionError::MissingTag("xPos"))?;
        let z = tags::int(level, "zPos")?.ok_or(RegionError::MissingTag("zPos"))?;
        let pos = ChunkPos::new(x, z, dim);

        let blocks = BlockStorage::deserialize(level, schema)?;
        let biomes = BiomeStorage::deserialize(level, schema)?;

        let mut block_light = empty_planes();
        for (sub, section) in blocks::sections(level)? {
            block_light[sub] = tags::byte_array(section, BLOCK_LIGHT_TAG)?.map(<[u8]>::to_vec);
        }

        let mut tile_entities = TileEntityMap::new();
        for tag in tags::list(level, TILE_ENTITIES_TAG)?.unwrap_or_default() {
            let local = tag.as_compound().and_then(|c| {
                let x = tags::int(c, "x").ok()??;
                let y = tags::int(c, "y").ok()??;
                let z = tags::int(c, "z").ok()??;
                LocalPos::from_world(x, y, z)
            });
            match local {
                Some(local) => {
                    tile_entities.insert(local, Arc::new(tag.clone()));
                }
                None => warn!(chunk = %pos, "tile entity without usable coordinates, skipping"),
            }
        }

        Ok(Self {
            pos,
            blocks,
            biomes,
            block_light,
            tile_entities,
        })
    }

    /// Gzip-compressed stored form.
    pub fn encode(&self) -> RegionResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.to_nbt().write_gzip(&mut bytes)?;
        Ok(bytes)
    }

    /// Decodes the gzip-compressed stored form.
    pub fn decode(bytes: &[u8], dim: i32, schema: &SchemaConfig) -> RegionResult<Self> {
        let file = NbtFile::read_gzip(&mut Cursor::new(bytes))?;
        Self::from_nbt(&file, dim, schema)
    }
}

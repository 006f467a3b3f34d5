//! The read-only view of a live host chunk.
//!
//! The host game owns its chunks and mutates them on its own thread. The
//! map core only reads them through [`HostChunk`] while the game loop is
//! quiescent, and copies everything it needs into a snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use voxmap_common::{
    column_index, ChunkPos, LocalPos, SchemaConfig, COLUMNS_PER_CHUNK, SUB_CHUNK_COUNT,
};
use voxmap_nbt::Tag;

use crate::packed::{set_nibble, BYTE_PLANE_LEN, NIBBLE_PLANE_LEN};

/// Tile entities keyed by chunk-local position. The payload is opaque.
pub type TileEntityMap = HashMap<LocalPos, Arc<Tag>>;

/// Byte planes a host sub-chunk may expose.
///
/// Vanilla hosts use `Blocks`, `Add` and `Data`; extended hosts add the
/// high id and metadata planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    /// Low 8 bits of the block id (full byte)
    Blocks,
    /// Block id bits 8-11 (nibble)
    Add,
    /// Block id bits 12-15 (nibble)
    BlocksB2Hi,
    /// Block id bits 16-23 (full byte)
    BlocksB3,
    /// Metadata bits 0-3 (nibble)
    Data,
    /// Metadata bits 4-7 (nibble)
    Data1High,
    /// Metadata bits 8-15 (full byte)
    Data2,
    /// Block light (nibble)
    BlockLight,
}

impl Plane {
    /// Every plane, in storage order.
    pub const ALL: [Plane; 8] = [
        Plane::Blocks,
        Plane::Add,
        Plane::BlocksB2Hi,
        Plane::BlocksB3,
        Plane::Data,
        Plane::Data1High,
        Plane::Data2,
        Plane::BlockLight,
    ];

    /// Whether the plane packs two cells per byte.
    #[must_use]
    pub const fn is_nibble(self) -> bool {
        !matches!(self, Plane::Blocks | Plane::BlocksB3 | Plane::Data2)
    }

    /// Byte length of a full plane.
    #[must_use]
    pub const fn byte_len(self) -> usize {
        if self.is_nibble() {
            NIBBLE_PLANE_LEN
        } else {
            BYTE_PLANE_LEN
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Read access to a host chunk.
///
/// A sub-chunk exists on the host iff its [`Plane::Blocks`] plane does.
pub trait HostChunk: Send + Sync {
    /// Position of the chunk.
    fn pos(&self) -> ChunkPos;

    /// Whether this is the host's empty placeholder chunk.
    fn is_empty(&self) -> bool;

    /// A byte plane of sub-chunk `sub`, if the host has it.
    fn plane(&self, sub: usize, plane: Plane) -> Option<&[u8]>;

    /// One byte per column, for hosts with vanilla biomes.
    fn biome_bytes(&self) -> Option<&[u8]> {
        None
    }

    /// Two bytes per column, for hosts with extended biomes.
    fn biome_shorts(&self) -> Option<&[u16]> {
        None
    }

    /// Tile entities of the chunk.
    fn tile_entities(&self) -> &TileEntityMap;
}

#[derive(Debug, Clone, Default)]
struct MemorySection {
    planes: [Option<Vec<u8>>; Plane::ALL.len()],
}

impl MemorySection {
    fn new() -> Self {
        let mut section = Self::default();
        section.planes[Plane::Blocks.index()] = Some(vec![0; Plane::Blocks.byte_len()]);
        section.planes[Plane::Data.index()] = Some(vec![0; Plane::Data.byte_len()]);
        section.planes[Plane::BlockLight.index()] = Some(vec![0; Plane::BlockLight.byte_len()]);
        section
    }

    /// Writes `value` into `plane`, allocating it only when `value` is non-zero.
    fn put(&mut self, plane: Plane, off: usize, value: u32) {
        let slot = &mut self.planes[plane.index()];
        if slot.is_none() && value == 0 {
            return;
        }
        let bytes = slot.get_or_insert_with(|| vec![0; plane.byte_len()]);
        if plane.is_nibble() {
            set_nibble(bytes, off, (value & 0xF) as u8);
        } else if let Some(b) = bytes.get_mut(off) {
            *b = (value & 0xFF) as u8;
        }
    }
}

/// In-memory host chunk, laid out the way the host stores its planes.
///
/// Used by the maintenance tools and tests in place of a live game chunk.
#[derive(Debug, Clone)]
pub struct MemoryChunk {
    pos: ChunkPos,
    schema: SchemaConfig,
    sections: [Option<MemorySection>; SUB_CHUNK_COUNT],
    biome_bytes: Option<Vec<u8>>,
    biome_shorts: Option<Vec<u16>>,
    tile_entities: TileEntityMap,
}

impl MemoryChunk {
    /// Creates a chunk with no sub-chunks and biome 0 everywhere.
    #[must_use]
    pub fn new(pos: ChunkPos, schema: SchemaConfig) -> Self {
        let (biome_bytes, biome_shorts) = if schema.extended_biomes() {
            (None, Some(vec![0; COLUMNS_PER_CHUNK]))
        } else {
            (Some(vec![0; COLUMNS_PER_CHUNK]), None)
        };
        Self {
            pos,
            schema,
            sections: Default::default(),
            biome_bytes,
            biome_shorts,
            tile_entities: TileEntityMap::new(),
        }
    }

    fn section_mut(&mut self, sub: usize) -> &mut MemorySection {
        self.sections[sub & 0xF].get_or_insert_with(MemorySection::new)
    }

    /// Sets the block at `pos`, creating its sub-chunk if needed.
    ///
    /// Bits the schema cannot encode are dropped.
    pub fn set_block(&mut self, pos: LocalPos, id: u32, meta: u32) {
        let extended = self.schema.extended_blocks();
        let off = pos.cell_offset();
        let section = self.section_mut(pos.sub_chunk());

        section.put(Plane::Blocks, off, id);
        section.put(Plane::Add, off, id >> 8);
        section.put(Plane::Data, off, meta);
        if extended {
            section.put(Plane::BlocksB2Hi, off, id >> 12);
            section.put(Plane::BlocksB3, off, id >> 16);
            section.put(Plane::Data1High, off, meta >> 4);
            section.put(Plane::Data2, off, meta >> 8);
        }
    }

    /// Fills a whole sub-chunk with one block.
    pub fn fill_sub_chunk(&mut self, sub: u8, id: u32, meta: u32) {
        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    self.set_block(LocalPos::new(x, (sub << 4) | y, z), id, meta);
                }
            }
        }
    }

    /// Sets the block light at `pos`, creating its sub-chunk if needed.
    pub fn set_block_light(&mut self, pos: LocalPos, level: u8) {
        let off = pos.cell_offset();
        self.section_mut(pos.sub_chunk())
            .put(Plane::BlockLight, off, u32::from(level));
    }

    /// Sets the biome of column `(x, z)`.
    pub fn set_biome(&mut self, x: u8, z: u8, biome: u32) {
        let index = column_index(usize::from(x), usize::from(z));
        if let Some(shorts) = self.biome_shorts.as_mut() {
            shorts[index] = (biome & 0xFFFF) as u16;
        }
        if let Some(bytes) = self.biome_bytes.as_mut() {
            bytes[index] = (biome & 0xFF) as u8;
        }
    }

    /// Sets every column to `biome`.
    pub fn fill_biome(&mut self, biome: u32) {
        for z in 0..16 {
            for x in 0..16 {
                self.set_biome(x, z, biome);
            }
        }
    }

    /// Attaches a tile entity at `pos`.
    pub fn insert_tile_entity(&mut self, pos: LocalPos, tag: Tag) {
        self.tile_entities.insert(pos, Arc::new(tag));
    }
}

impl HostChunk for MemoryChunk {
    fn pos(&self) -> ChunkPos {
        self.pos
    }

    fn is_empty(&self) -> bool {
        self.sections.iter().all(Option::is_none)
    }

    fn plane(&self, sub: usize, plane: Plane) -> Option<&[u8]> {
        self.sections
            .get(sub)?
            .as_ref()?
            .planes[plane.index()]
            .as_deref()
    }

    fn biome_bytes(&self) -> Option<&[u8]> {
        self.biome_bytes.as_deref()
    }

    fn biome_shorts(&self) -> Option<&[u16]> {
        self.biome_shorts.as_deref()
    }

    fn tile_entities(&self) -> &TileEntityMap {
        &self.tile_entities
    }
}

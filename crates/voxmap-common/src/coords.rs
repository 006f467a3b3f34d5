//! Coordinate types for chunks, blocks, and cells inside a chunk.

use serde::{Deserialize, Serialize};

/// Width of a chunk along X and Z, in blocks.
pub const CHUNK_WIDTH: i32 = 16;

/// Number of sub-chunks stacked in a chunk column.
pub const SUB_CHUNK_COUNT: usize = 16;

/// Number of cells in one 16x16x16 sub-chunk.
pub const CELLS_PER_SUB_CHUNK: usize = 4096;

/// Number of (x, z) columns in a chunk.
pub const COLUMNS_PER_CHUNK: usize = 256;

/// Identifies a chunk column in a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    /// Chunk X coordinate (block X >> 4)
    pub x: i32,
    /// Chunk Z coordinate (block Z >> 4)
    pub z: i32,
    /// Dimension id
    pub dim: i32,
}

impl ChunkPos {
    /// Creates a new chunk position.
    #[must_use]
    pub const fn new(x: i32, z: i32, dim: i32) -> Self {
        Self { x, z, dim }
    }

    /// Returns the chunk containing the given block coordinates.
    #[must_use]
    pub const fn containing(block_x: i32, block_z: i32, dim: i32) -> Self {
        Self {
            x: block_x >> 4,
            z: block_z >> 4,
            dim,
        }
    }

    /// Squared distance to another chunk, in chunk units.
    ///
    /// Widened to `i64` so far-apart chunks cannot overflow.
    #[must_use]
    pub const fn distance_sq(self, other: Self) -> i64 {
        let dx = self.x as i64 - other.x as i64;
        let dz = self.z as i64 - other.z as i64;
        dx * dx + dz * dz
    }

    /// Returns the chunk offset by `(dx, dz)` in the same dimension.
    #[must_use]
    pub const fn offset(self, dx: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            z: self.z + dz,
            dim: self.dim,
        }
    }

    /// World block X of the chunk's west edge.
    #[must_use]
    pub const fn block_x(self) -> i32 {
        self.x * CHUNK_WIDTH
    }

    /// World block Z of the chunk's north edge.
    #[must_use]
    pub const fn block_z(self) -> i32 {
        self.z * CHUNK_WIDTH
    }
}

impl std::fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}) in dim {}", self.x, self.z, self.dim)
    }
}

/// Block position local to a chunk column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalPos {
    /// X within the chunk (0-15)
    pub x: u8,
    /// World Y (0-255)
    pub y: u8,
    /// Z within the chunk (0-15)
    pub z: u8,
}

impl LocalPos {
    /// Creates a local position, masking X and Z into the chunk.
    #[must_use]
    pub const fn new(x: u8, y: u8, z: u8) -> Self {
        Self {
            x: x & 0xF,
            y,
            z: z & 0xF,
        }
    }

    /// Converts world block coordinates to a chunk-local position.
    ///
    /// Returns `None` when `y` is outside the 0-255 column.
    #[must_use]
    pub fn from_world(x: i32, y: i32, z: i32) -> Option<Self> {
        let y = u8::try_from(y).ok()?;
        Some(Self::new((x & 0xF) as u8, y, (z & 0xF) as u8))
    }

    /// Sub-chunk index holding this position.
    #[must_use]
    pub const fn sub_chunk(self) -> usize {
        (self.y >> 4) as usize
    }

    /// Cell offset inside the sub-chunk.
    #[must_use]
    pub const fn cell_offset(self) -> usize {
        cell_offset(self.x as usize, (self.y & 0xF) as usize, self.z as usize)
    }

    /// World coordinates of this position inside `chunk`.
    #[must_use]
    pub const fn to_world(self, chunk: ChunkPos) -> (i32, i32, i32) {
        (
            chunk.block_x() + self.x as i32,
            self.y as i32,
            chunk.block_z() + self.z as i32,
        )
    }
}

/// Cell offset inside a sub-chunk: `(y << 8) | (z << 4) | x`.
#[inline]
#[must_use]
pub const fn cell_offset(x: usize, y: usize, z: usize) -> usize {
    ((y & 0xF) << 8) | ((z & 0xF) << 4) | (x & 0xF)
}

/// Column index used by biome arrays: `(z << 4) | x`.
#[inline]
#[must_use]
pub const fn column_index(x: usize, z: usize) -> usize {
    ((z & 0xF) << 4) | (x & 0xF)
}

/// Player position in block coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerPos {
    /// Block X
    pub x: i32,
    /// Block Z
    pub z: i32,
    /// Dimension the player is in
    pub dim: i32,
}

impl PlayerPos {
    /// Creates a new player position.
    #[must_use]
    pub const fn new(x: i32, z: i32, dim: i32) -> Self {
        Self { x, z, dim }
    }

    /// Chunk the player stands in.
    #[must_use]
    pub const fn chunk(self) -> ChunkPos {
        ChunkPos::containing(self.x, self.z, self.dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containing_negative_blocks() {
        assert_eq!(ChunkPos::containing(-1, -17, 0), ChunkPos::new(-1, -2, 0));
        assert_eq!(ChunkPos::containing(15, 16, 0), ChunkPos::new(0, 1, 0));
    }

    #[test]
    fn test_distance_sq() {
        let a = ChunkPos::new(10, 20, 0);
        assert_eq!(a.distance_sq(ChunkPos::new(13, 24, 0)), 25);
        assert_eq!(
            ChunkPos::new(i32::MIN, 0, 0).distance_sq(ChunkPos::new(i32::MAX, 0, 0)),
            (u32::MAX as i64).pow(2)
        );
    }

    #[test]
    fn test_cell_offset_layout() {
        assert_eq!(cell_offset(1, 0, 0), 1);
        assert_eq!(cell_offset(0, 0, 1), 16);
        assert_eq!(cell_offset(0, 1, 0), 256);
        assert_eq!(cell_offset(15, 15, 15), 4095);
    }

    #[test]
    fn test_local_pos_world_round_trip() {
        let chunk = ChunkPos::new(-3, 7, 0);
        let local = LocalPos::from_world(-45, 70, 120).expect("y in range");
        assert_eq!(local, LocalPos::new(3, 70, 8));
        assert_eq!(local.to_world(chunk), (-45, 70, 120));
        assert_eq!(local.sub_chunk(), 4);
        assert!(LocalPos::from_world(0, 256, 0).is_none());
    }
}

//! Top-down surface rendering of snapshots.

use voxmap_common::{cell_offset, column_index, ChunkPos, COLUMNS_PER_CHUNK, SUB_CHUNK_COUNT};

use crate::biome::BiomeStorage;
use crate::blocks::{BlockSource, BlockStorage};
use crate::colours::{block_and_meta, BlockColourTable};
use crate::snapshot::ChunkSnapshot;

/// One chunk of the surface map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceTile {
    /// Chunk the tile covers
    pub pos: ChunkPos,
    /// ARGB per column, indexed by `(z << 4) | x`; 0 where nothing was hit
    pub pixels: Box<[u32; COLUMNS_PER_CHUNK]>,
    /// World y of the topmost visible block per column
    pub heights: Box<[u8; COLUMNS_PER_CHUNK]>,
}

impl SurfaceTile {
    /// Renders a snapshot with the given colour table.
    #[must_use]
    pub fn render(snapshot: &ChunkSnapshot, colours: &BlockColourTable) -> Self {
        let (pos, biomes) = (snapshot.pos(), snapshot.biomes());
        match snapshot.blocks() {
            BlockStorage::Vanilla(blocks) => render_with(pos, blocks, biomes, colours),
            BlockStorage::Extended(blocks) => render_with(pos, blocks, biomes, colours),
        }
    }

    /// Pixel of column `(x, z)`.
    #[must_use]
    pub fn pixel(&self, x: usize, z: usize) -> u32 {
        self.pixels[column_index(x, z)]
    }

    /// Height of column `(x, z)`.
    #[must_use]
    pub fn height(&self, x: usize, z: usize) -> u8 {
        self.heights[column_index(x, z)]
    }
}

fn render_with<B: BlockSource>(
    pos: ChunkPos,
    blocks: &B,
    biomes: &BiomeStorage,
    colours: &BlockColourTable,
) -> SurfaceTile {
    let mut pixels = Box::new([0u32; COLUMNS_PER_CHUNK]);
    let mut heights = Box::new([0u8; COLUMNS_PER_CHUNK]);
    let present: Vec<usize> = (0..SUB_CHUNK_COUNT)
        .rev()
        .filter(|&sub| blocks.has_sub_chunk(sub))
        .collect();

    for z in 0..16 {
        for x in 0..16 {
            let column = column_index(x, z);
            let biome = biomes.biome_at(column);
            let (pixel, height) = composite_column(blocks, &present, colours, x, z, biome);
            pixels[column] = pixel;
            heights[column] = height;
        }
    }

    SurfaceTile { pos, pixels, heights }
}

/// Front-to-back alpha compositing down one column.
fn composite_column<B: BlockSource>(
    blocks: &B,
    present: &[usize],
    colours: &BlockColourTable,
    x: usize,
    z: usize,
    biome: u32,
) -> (u32, u8) {
    let mut remaining = 255u32;
    let (mut r, mut g, mut b) = (0u32, 0u32, 0u32);
    let mut height = None;

    'walk: for &sub in present {
        for y in (0..16).rev() {
            let off = cell_offset(x, y, z);
            let key = block_and_meta(blocks.id_at(sub, off), blocks.meta_at(sub, off));
            let colour = colours.pixel_packed(key, biome);
            let alpha = colour >> 24;
            if alpha == 0 {
                continue;
            }
            height.get_or_insert(((sub << 4) | y) as u8);

            let weight = (remaining * alpha / 255).max(1);
            r += ((colour >> 16) & 0xFF) * weight;
            g += ((colour >> 8) & 0xFF) * weight;
            b += (colour & 0xFF) * weight;
            remaining -= weight;
            if remaining == 0 {
                break 'walk;
            }
        }
    }

    let covered = 255 - remaining;
    if covered == 0 {
        return (0, 0);
    }
    let pixel = (covered << 24) | ((r / covered) << 16) | ((g / covered) << 8) | (b / covered);
    (pixel, height.unwrap_or(0))
}

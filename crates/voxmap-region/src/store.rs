//! Destinations for rendered tiles and persisted chunks.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;
use voxmap_common::{ChunkPos, SchemaConfig};

use crate::atomic::write_atomic;
use crate::error::RegionResult;
use crate::raster::SurfaceTile;
use crate::snapshot::ChunkSnapshot;

/// Persistent chunk storage.
pub trait RegionStore: Send + Sync {
    /// Writes a snapshot, replacing any stored copy of the same chunk.
    fn save_chunk(&self, snapshot: &ChunkSnapshot) -> RegionResult<()>;

    /// Reads a chunk back, or `None` if it was never saved.
    fn load_chunk(&self, pos: ChunkPos) -> RegionResult<Option<ChunkSnapshot>>;
}

/// Receiver of rendered surface tiles.
pub trait TileSink: Send + Sync {
    /// Accepts a freshly rendered tile.
    fn update_tile(&self, tile: SurfaceTile);
}

/// One gzip NBT file per chunk under `<root>/DIM<dim>/c.<x>.<z>.nbt.gz`.
#[derive(Debug, Clone)]
pub struct NbtDirectoryStore {
    root: PathBuf,
    schema: SchemaConfig,
}

impl NbtDirectoryStore {
    /// Creates a store rooted at `root`. Directories are created on first save.
    pub fn new(root: impl Into<PathBuf>, schema: SchemaConfig) -> Self {
        Self {
            root: root.into(),
            schema,
        }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the chunk at `pos`.
    #[must_use]
    pub fn chunk_path(&self, pos: ChunkPos) -> PathBuf {
        self.root
            .join(format!("DIM{}", pos.dim))
            .join(format!("c.{}.{}.nbt.gz", pos.x, pos.z))
    }
}

impl RegionStore for NbtDirectoryStore {
    fn save_chunk(&self, snapshot: &ChunkSnapshot) -> RegionResult<()> {
        let bytes = snapshot.encode()?;
        let path = self.chunk_path(snapshot.pos());
        write_atomic(&path, |w| w.write_all(&bytes))?;
        debug!(chunk = %snapshot.pos(), bytes = bytes.len(), "saved chunk");
        Ok(())
    }

    fn load_chunk(&self, pos: ChunkPos) -> RegionResult<Option<ChunkSnapshot>> {
        let bytes = match fs::read(self.chunk_path(pos)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        ChunkSnapshot::decode(&bytes, pos.dim, &self.schema).map(Some)
    }
}

/// Keeps the latest tile of every chunk in memory.
#[derive(Debug, Default)]
pub struct MemoryTileCache {
    tiles: Mutex<HashMap<ChunkPos, SurfaceTile>>,
}

impl MemoryTileCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest tile of a chunk.
    #[must_use]
    pub fn tile(&self, pos: ChunkPos) -> Option<SurfaceTile> {
        self.tiles.lock().get(&pos).cloned()
    }

    /// Number of chunks with a tile.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.lock().len()
    }

    /// Whether no tile was received yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.lock().is_empty()
    }
}

impl TileSink for MemoryTileCache {
    fn update_tile(&self, tile: SurfaceTile) {
        self.tiles.lock().insert(tile.pos, tile);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colours::BlockColourTable;
    use crate::host::MemoryChunk;
    use voxmap_common::LocalPos;

    #[test]
    fn test_directory_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let schema = SchemaConfig::vanilla();
        let store = NbtDirectoryStore::new(dir.path(), schema);

        let pos = ChunkPos::new(-4, 9, -1);
        let mut host = MemoryChunk::new(pos, schema);
        host.set_block(LocalPos::new(1, 2, 3), 42, 5);
        let snapshot = ChunkSnapshot::capture(&host, &schema);

        assert!(store.load_chunk(pos).expect("load").is_none());
        store.save_chunk(&snapshot).expect("save");
        assert!(dir.path().join("DIM-1/c.-4.9.nbt.gz").exists());

        let loaded = store.load_chunk(pos).expect("load").expect("stored");
        assert_eq!(loaded.pos(), pos);
        let local = LocalPos::new(1, 2, 3);
        assert_eq!(loaded.id_at(local.sub_chunk(), local.cell_offset()), 42);
        assert_eq!(loaded.meta_at(local.sub_chunk(), local.cell_offset()), 5);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = NbtDirectoryStore::new(dir.path(), SchemaConfig::vanilla());
        let pos = ChunkPos::new(0, 0, 0);
        let path = store.chunk_path(pos);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, b"garbage").expect("write");
        assert!(store.load_chunk(pos).is_err());
    }

    #[test]
    fn test_tile_cache_keeps_latest() {
        let schema = SchemaConfig::vanilla();
        let cache = MemoryTileCache::new();
        assert!(cache.is_empty());

        let pos = ChunkPos::new(3, 3, 0);
        let mut host = MemoryChunk::new(pos, schema);
        let mut colours = BlockColourTable::default();
        colours.set_colour(1, 0, 0xFF10_2030);

        cache.update_tile(SurfaceTile::render(&ChunkSnapshot::capture(&host, &schema), &colours));
        host.set_block(LocalPos::new(0, 0, 0), 1, 0);
        cache.update_tile(SurfaceTile::render(&ChunkSnapshot::capture(&host, &schema), &colours));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.tile(pos).expect("tile").pixel(0, 0), 0xFF10_2030);
    }
}

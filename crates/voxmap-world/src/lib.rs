//! # voxmap World
//!
//! Scheduling side of the map generator:
//! - Map configuration loaded from TOML
//! - Background task contract and the worker-pool executor
//! - Chunk manager tracking loaded chunks and driving per-tick work

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod chunk_manager;
pub mod config;
pub mod executor;
pub mod task;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chunk_manager::*;
    pub use crate::config::*;
    pub use crate::executor::*;
    pub use crate::task::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::RwLock;
    use voxmap_common::{ChunkPos, LocalPos, PlayerPos};
    use voxmap_region::{BlockColourTable, MemoryChunk, MemoryTileCache, NbtDirectoryStore};

    #[test]
    fn test_session_from_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = MapConfig::default();
        config.region_dir = dir.path().join("regions");
        config.region_file_output_enabled_mp = false;
        let schema = config.schema_config().expect("valid schema");

        let settings = ManagerSettings::from_config(&config, schema, true);
        assert!(!settings.save_enabled);
        assert_eq!(settings.chunks_per_tick, 30);

        let executor = Arc::new(Executor::new(config.worker_threads).expect("spawn workers"));
        let tiles = Arc::new(MemoryTileCache::new());
        let outputs = MapOutputs {
            colours: Arc::new(RwLock::new(BlockColourTable::new(schema))),
            tiles: tiles.clone(),
            store: Arc::new(NbtDirectoryStore::new(&config.region_dir, schema)),
            underground: None,
        };
        let manager = ChunkManager::new(settings, executor.clone(), outputs);

        let mut host = MemoryChunk::new(ChunkPos::new(0, 0, 0), schema);
        host.set_block(LocalPos::new(0, 64, 0), 1, 0);
        manager.add_chunk(Arc::new(host));
        manager.on_tick(1, PlayerPos::new(8, 8, 0));
        manager.close();

        executor.shutdown();
        assert!(tiles.tile(ChunkPos::new(0, 0, 0)).is_some());
        assert!(!config.region_dir.exists());
    }
}

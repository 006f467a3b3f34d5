//! Tracking of loaded host chunks and per-tick map work.
//!
//! The manager keeps every chunk the host has loaded in insertion order
//! and walks them round-robin, a bounded number per tick. Chunks near the
//! player are snapshotted for rendering and marked viewed; viewed chunks
//! are saved when the host unloads them and when the manager closes.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace};
use voxmap_common::{ChunkPos, PlayerPos, SchemaConfig};
use voxmap_region::{BlockColourTable, ChunkSnapshot, HostChunk, RegionStore, TileSink};

use crate::config::MapConfig;
use crate::task::{
    SaveChunk, TaskQueue, UndergroundSink, UpdateSurfaceChunks, UpdateUndergroundChunks,
    UNDERGROUND_SLOTS,
};

/// Chunk is within render distance on the latest visit.
pub const VISIBLE: u8 = 0x01;

/// Chunk has been within render distance since it was added.
pub const VIEWED: u8 = 0x02;

/// Every this many ticks the underground pass replaces the surface pass.
pub const UNDERGROUND_INTERVAL: u64 = 16;

/// Where tasks deliver their results.
#[derive(Clone)]
pub struct MapOutputs {
    /// Colour table used for rendering
    pub colours: Arc<RwLock<BlockColourTable>>,
    /// Receiver of surface tiles
    pub tiles: Arc<dyn TileSink>,
    /// Store for viewed chunks
    pub store: Arc<dyn RegionStore>,
    /// Receiver of underground batches; without one the batch is dropped
    pub underground: Option<Arc<dyn UndergroundSink>>,
}

/// Per-session scheduling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Chunks examined per surface tick
    pub chunks_per_tick: usize,
    /// Squared chunk distance for visibility
    pub max_chunk_save_dist_sq: i64,
    /// Whether viewed chunks are persisted
    pub save_enabled: bool,
    /// Block and biome encoding of snapshots
    pub schema: SchemaConfig,
}

impl ManagerSettings {
    /// Settings for a session from the map configuration.
    #[must_use]
    pub fn from_config(config: &MapConfig, schema: SchemaConfig, multiplayer: bool) -> Self {
        Self {
            chunks_per_tick: config.chunks_per_tick.max(1),
            max_chunk_save_dist_sq: config.max_chunk_save_dist_sq,
            save_enabled: config.region_output_enabled(multiplayer),
            schema,
        }
    }
}

struct Tracked<H> {
    chunk: Arc<H>,
    flags: u8,
}

struct ManagerState<H> {
    chunks: IndexMap<ChunkPos, Tracked<H>>,
    /// Index of the entry visited last.
    cursor: Option<usize>,
    closed: bool,
}

impl<H> ManagerState<H> {
    /// Moves the cursor to the next entry, wrapping around.
    fn advance(&mut self) -> usize {
        let next = self
            .cursor
            .map_or(0, |c| (c + 1) % self.chunks.len().max(1));
        self.cursor = Some(next);
        next
    }

    /// Keeps the cursor pointing before the successor of a removed entry.
    fn on_removed(&mut self, removed: usize) {
        self.cursor = match self.cursor {
            _ if self.chunks.is_empty() => None,
            Some(c) if removed < c => Some(c - 1),
            Some(c) if removed == c => c.checked_sub(1),
            other => other,
        };
    }
}

/// Tracks host chunks and schedules snapshot work.
///
/// Every operation takes the same lock, so calls from the observer thread
/// are mutually exclusive. Snapshots are taken and submitted under the lock.
pub struct ChunkManager<H: HostChunk, Q: TaskQueue> {
    state: Mutex<ManagerState<H>>,
    queue: Q,
    settings: ManagerSettings,
    outputs: MapOutputs,
}

impl<H: HostChunk, Q: TaskQueue> ChunkManager<H, Q> {
    /// Creates an open manager with no tracked chunks.
    pub fn new(settings: ManagerSettings, queue: Q, outputs: MapOutputs) -> Self {
        Self {
            state: Mutex::new(ManagerState {
                chunks: IndexMap::new(),
                cursor: None,
                closed: false,
            }),
            queue,
            settings,
            outputs,
        }
    }

    /// Scheduling settings.
    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Starts tracking a loaded chunk.
    ///
    /// Re-adding a tracked position swaps in the new handle and keeps its flags.
    pub fn add_chunk(&self, chunk: Arc<H>) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        let pos = chunk.pos();
        match state.chunks.get_mut(&pos) {
            Some(tracked) => tracked.chunk = chunk,
            None => {
                state.chunks.insert(pos, Tracked { chunk, flags: 0 });
            }
        }
        trace!(chunk = %pos, tracked = state.chunks.len(), "chunk added");
    }

    /// Stops tracking a chunk, saving it first if it was ever viewed.
    ///
    /// Unknown positions are ignored.
    pub fn remove_chunk(&self, pos: ChunkPos) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        let Some((index, _, tracked)) = state.chunks.shift_remove_full(&pos) else {
            debug!(chunk = %pos, "removing untracked chunk");
            return;
        };
        if tracked.flags & VIEWED != 0 {
            self.save(&tracked.chunk);
        }
        state.on_removed(index);
        trace!(chunk = %pos, tracked = state.chunks.len(), "chunk removed");
    }

    /// Stops tracking the chunk behind a host handle.
    pub fn remove_chunk_handle(&self, chunk: &H) {
        self.remove_chunk(chunk.pos());
    }

    /// Queues a save of every viewed chunk. Returns how many were queued.
    pub fn save_all(&self) -> usize {
        let state = self.state.lock();
        self.save_viewed(&state)
    }

    /// Saves every viewed chunk and stops tracking. Further calls are no-ops.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let saved = self.save_viewed(&state);
        state.chunks.clear();
        state.cursor = None;
        info!(saved, "chunk manager closed");
    }

    /// Runs the per-tick pass for the player's position.
    pub fn on_tick(&self, tick: u64, player: PlayerPos) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        if tick % UNDERGROUND_INTERVAL == 0 {
            self.update_underground(&state, player.chunk());
        } else {
            self.update_surface(&mut state, player.chunk());
        }
    }

    /// Submits an externally built batch for rendering.
    pub fn force_chunks(&self, snapshots: Vec<Option<ChunkSnapshot>>) {
        let _state = self.state.lock();
        self.submit_surface(snapshots);
    }

    /// Number of tracked chunks.
    pub fn tracked_len(&self) -> usize {
        self.state.lock().chunks.len()
    }

    /// Flags of a tracked chunk.
    pub fn flags(&self, pos: ChunkPos) -> Option<u8> {
        self.state.lock().chunks.get(&pos).map(|t| t.flags)
    }

    /// Whether [`ChunkManager::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn update_surface(&self, state: &mut ManagerState<H>, player: ChunkPos) {
        let batch = state.chunks.len().min(self.settings.chunks_per_tick);
        if batch == 0 {
            return;
        }

        let mut snapshots = Vec::with_capacity(batch);
        for _ in 0..batch {
            let index = state.advance();
            let Some((pos, tracked)) = state.chunks.get_index_mut(index) else {
                snapshots.push(None);
                continue;
            };

            let visible = pos.dim == player.dim
                && pos.distance_sq(player) <= self.settings.max_chunk_save_dist_sq;
            if visible {
                tracked.flags |= VISIBLE | VIEWED;
            } else {
                tracked.flags &= !VISIBLE;
            }

            let snapshot = (visible && !tracked.chunk.is_empty())
                .then(|| ChunkSnapshot::capture(tracked.chunk.as_ref(), &self.settings.schema));
            snapshots.push(snapshot);
        }
        self.submit_surface(snapshots);
    }

    fn update_underground(&self, state: &ManagerState<H>, player: ChunkPos) {
        let origin = player.offset(-1, -1);
        let mut slots: Box<[Option<ChunkSnapshot>; UNDERGROUND_SLOTS]> = Box::default();
        for z in 0..3 {
            for x in 0..3 {
                let pos = origin.offset(x, z);
                slots[(z * 3 + x) as usize] = state
                    .chunks
                    .get(&pos)
                    .filter(|t| !t.chunk.is_empty())
                    .map(|t| ChunkSnapshot::capture(t.chunk.as_ref(), &self.settings.schema));
            }
        }

        match &self.outputs.underground {
            Some(sink) => {
                self.queue
                    .submit(Box::new(UpdateUndergroundChunks::new(player, slots, sink.clone())));
            }
            None => trace!(center = %player, "no underground sink, dropping batch"),
        }
    }

    fn submit_surface(&self, snapshots: Vec<Option<ChunkSnapshot>>) {
        self.queue.submit(Box::new(UpdateSurfaceChunks::new(
            snapshots,
            self.outputs.colours.clone(),
            self.outputs.tiles.clone(),
        )));
    }

    fn save_viewed(&self, state: &ManagerState<H>) -> usize {
        let mut saved = 0;
        for tracked in state.chunks.values() {
            if tracked.flags & VIEWED != 0 && self.save(&tracked.chunk) {
                saved += 1;
            }
        }
        if saved > 0 {
            debug!("Queued {saved} chunk saves");
        }
        saved
    }

    /// Queues a save of `chunk` if saving is enabled and the chunk has data.
    fn save(&self, chunk: &H) -> bool {
        if !self.settings.save_enabled || chunk.is_empty() {
            return false;
        }
        let snapshot = ChunkSnapshot::capture(chunk, &self.settings.schema);
        self.queue
            .submit(Box::new(SaveChunk::new(snapshot, self.outputs.store.clone())));
        true
    }
}

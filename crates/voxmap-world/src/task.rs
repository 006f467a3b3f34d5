//! Background tasks and the queue they are submitted to.
//!
//! A task runs once on a worker thread, then its completion hook runs on
//! the observer thread. Tasks own everything they touch; none of them
//! reaches back into host state.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error};
use voxmap_common::ChunkPos;
use voxmap_region::{BlockColourTable, ChunkSnapshot, RegionStore, SurfaceTile, TileSink};

/// Number of slots in an underground batch (3x3 chunks).
pub const UNDERGROUND_SLOTS: usize = 9;

/// What a task does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Render a batch of snapshots into surface tiles
    UpdateSurfaceChunks,
    /// Hand a 3x3 batch around the player to the underground renderer
    UpdateUndergroundChunks,
    /// Persist one snapshot
    SaveChunk,
}

/// Unit of background work.
pub trait Task: Send {
    /// Kind of work.
    fn kind(&self) -> TaskKind;

    /// Performs the work on a worker thread.
    fn run(&mut self);

    /// Runs on the observer thread after [`Task::run`].
    fn on_complete(&mut self) {}

    /// Chunks whose snapshots the task carries.
    fn positions(&self) -> Vec<ChunkPos> {
        Vec::new()
    }
}

/// Accepts tasks for execution.
pub trait TaskQueue: Send + Sync {
    /// Queues a task. Tasks run in submission order per worker.
    fn submit(&self, task: Box<dyn Task>);
}

impl<Q: TaskQueue + ?Sized> TaskQueue for Arc<Q> {
    fn submit(&self, task: Box<dyn Task>) {
        (**self).submit(task);
    }
}

/// Receiver of the 3x3 snapshot batch around the player.
pub trait UndergroundSink: Send + Sync {
    /// Slot `z * 3 + x` holds the chunk at `(center.x - 1 + x, center.z - 1 + z)`.
    fn update_underground(&self, center: ChunkPos, slots: &[Option<ChunkSnapshot>; UNDERGROUND_SLOTS]);
}

/// Renders snapshots and delivers the tiles.
pub struct UpdateSurfaceChunks {
    snapshots: Vec<Option<ChunkSnapshot>>,
    colours: Arc<RwLock<BlockColourTable>>,
    tiles: Arc<dyn TileSink>,
    rendered: Vec<SurfaceTile>,
}

impl UpdateSurfaceChunks {
    /// Creates the task; empty slots are skipped.
    pub fn new(
        snapshots: Vec<Option<ChunkSnapshot>>,
        colours: Arc<RwLock<BlockColourTable>>,
        tiles: Arc<dyn TileSink>,
    ) -> Self {
        Self {
            snapshots,
            colours,
            tiles,
            rendered: Vec::new(),
        }
    }

    /// Snapshot slots of the batch.
    #[must_use]
    pub fn snapshots(&self) -> &[Option<ChunkSnapshot>] {
        &self.snapshots
    }
}

impl Task for UpdateSurfaceChunks {
    fn kind(&self) -> TaskKind {
        TaskKind::UpdateSurfaceChunks
    }

    fn run(&mut self) {
        let colours = self.colours.read();
        self.rendered = self
            .snapshots
            .iter()
            .flatten()
            .map(|snapshot| SurfaceTile::render(snapshot, &colours))
            .collect();
    }

    fn on_complete(&mut self) {
        for tile in self.rendered.drain(..) {
            self.tiles.update_tile(tile);
        }
    }

    fn positions(&self) -> Vec<ChunkPos> {
        self.snapshots.iter().flatten().map(ChunkSnapshot::pos).collect()
    }
}

/// Hands the underground batch to its sink.
pub struct UpdateUndergroundChunks {
    center: ChunkPos,
    slots: Box<[Option<ChunkSnapshot>; UNDERGROUND_SLOTS]>,
    sink: Arc<dyn UndergroundSink>,
}

impl UpdateUndergroundChunks {
    /// Creates the task for the batch centred on `center`.
    pub fn new(
        center: ChunkPos,
        slots: Box<[Option<ChunkSnapshot>; UNDERGROUND_SLOTS]>,
        sink: Arc<dyn UndergroundSink>,
    ) -> Self {
        Self { center, slots, sink }
    }
}

impl Task for UpdateUndergroundChunks {
    fn kind(&self) -> TaskKind {
        TaskKind::UpdateUndergroundChunks
    }

    fn run(&mut self) {
        self.sink.update_underground(self.center, &self.slots);
    }

    fn positions(&self) -> Vec<ChunkPos> {
        self.slots.iter().flatten().map(ChunkSnapshot::pos).collect()
    }
}

/// Writes one snapshot to the region store.
pub struct SaveChunk {
    snapshot: ChunkSnapshot,
    store: Arc<dyn RegionStore>,
}

impl SaveChunk {
    /// Creates the task.
    pub fn new(snapshot: ChunkSnapshot, store: Arc<dyn RegionStore>) -> Self {
        Self { snapshot, store }
    }

    /// Snapshot to persist.
    #[must_use]
    pub fn snapshot(&self) -> &ChunkSnapshot {
        &self.snapshot
    }
}

impl Task for SaveChunk {
    fn kind(&self) -> TaskKind {
        TaskKind::SaveChunk
    }

    fn run(&mut self) {
        match self.store.save_chunk(&self.snapshot) {
            Ok(()) => debug!(chunk = %self.snapshot.pos(), "chunk saved"),
            Err(e) => error!(chunk = %self.snapshot.pos(), "failed to save chunk: {e}"),
        }
    }

    fn positions(&self) -> Vec<ChunkPos> {
        vec![self.snapshot.pos()]
    }
}

/// Runs each task to completion on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineQueue;

impl TaskQueue for InlineQueue {
    fn submit(&self, mut task: Box<dyn Task>) {
        task.run();
        task.on_complete();
    }
}

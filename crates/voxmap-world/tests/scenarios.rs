//! End-to-end behaviour across the region and world crates.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use proptest::prelude::*;
use voxmap_common::{cell_offset, ChunkPos, LocalPos, PlayerPos, SchemaConfig};
use voxmap_region::{
    block_and_meta, BlockColourTable, BlockType, ChunkSnapshot, MemoryChunk, MemoryTileCache,
    NbtDirectoryStore,
};
use voxmap_world::{
    ChunkManager, InlineQueue, ManagerSettings, MapOutputs, Task, TaskKind, TaskQueue,
    UndergroundSink, UNDERGROUND_SLOTS, VIEWED,
};

#[derive(Default)]
struct RecordingQueue {
    tasks: Mutex<Vec<(TaskKind, Vec<ChunkPos>)>>,
}

impl TaskQueue for RecordingQueue {
    fn submit(&self, task: Box<dyn Task>) {
        self.tasks.lock().push((task.kind(), task.positions()));
    }
}

impl RecordingQueue {
    fn count(&self, kind: TaskKind) -> usize {
        self.tasks.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    fn positions(&self, kind: TaskKind) -> Vec<ChunkPos> {
        self.tasks
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .flat_map(|(_, p)| p.iter().copied())
            .collect()
    }

    fn clear(&self) {
        self.tasks.lock().clear();
    }
}

#[derive(Default)]
struct RecordingUnderground {
    batches: Mutex<Vec<(ChunkPos, Vec<Option<ChunkPos>>)>>,
}

impl UndergroundSink for RecordingUnderground {
    fn update_underground(&self, center: ChunkPos, slots: &[Option<ChunkSnapshot>; UNDERGROUND_SLOTS]) {
        let slots = slots.iter().map(|s| s.as_ref().map(ChunkSnapshot::pos)).collect();
        self.batches.lock().push((center, slots));
    }
}

fn outputs(dir: &Path, schema: SchemaConfig) -> MapOutputs {
    MapOutputs {
        colours: Arc::new(RwLock::new(BlockColourTable::new(schema))),
        tiles: Arc::new(MemoryTileCache::new()),
        store: Arc::new(NbtDirectoryStore::new(dir, schema)),
        underground: None,
    }
}

fn settings(chunks_per_tick: usize, max_chunk_save_dist_sq: i64) -> ManagerSettings {
    ManagerSettings {
        chunks_per_tick,
        max_chunk_save_dist_sq,
        save_enabled: true,
        schema: SchemaConfig::vanilla(),
    }
}

fn solid_chunk(pos: ChunkPos) -> Arc<MemoryChunk> {
    let mut host = MemoryChunk::new(pos, SchemaConfig::vanilla());
    host.fill_sub_chunk(4, 1, 0);
    Arc::new(host)
}

/// Tick numbers that never trigger the underground pass.
fn surface_ticks() -> impl Iterator<Item = u64> {
    (1..).filter(|t| t % 16 != 0)
}

#[test]
fn test_round_trip_vanilla() {
    let schema = SchemaConfig::vanilla();
    let mut host = MemoryChunk::new(ChunkPos::new(2, -3, 0), schema);
    host.fill_sub_chunk(3, 1, 0);
    host.set_block(LocalPos::new(0, 7 * 16, 0), 17, 12);

    let snapshot = ChunkSnapshot::capture(&host, &schema);
    let bytes = snapshot.encode().expect("encode");
    let decoded = ChunkSnapshot::decode(&bytes, 0, &schema).expect("decode");

    for sub in 0..16 {
        assert_eq!(decoded.has_sub_chunk(sub), sub == 3 || sub == 7, "sub-chunk {sub}");
    }
    assert_eq!(decoded.id_at(7, 0), 17);
    assert_eq!(decoded.meta_at(7, 0), 12);
    for off in 1..4096 {
        assert_eq!(decoded.id_at(7, off), 0);
        assert_eq!(decoded.meta_at(7, off), 0);
        assert_eq!(decoded.id_at(3, off), 1);
    }
}

#[test]
fn test_round_trip_extended() {
    let schema = SchemaConfig::extended(true, true, 1 << 20, 12, 1 << 16).expect("valid schema");
    let mut host = MemoryChunk::new(ChunkPos::new(0, 0, 0), schema);
    host.fill_sub_chunk(3, 1, 0);
    host.set_block(LocalPos::new(4, 5 * 16, 6), 0xABCDE, 0xFED);
    host.set_biome(1, 2, 0x1234);

    let decoded = ChunkSnapshot::decode(
        &ChunkSnapshot::capture(&host, &schema).encode().expect("encode"),
        0,
        &schema,
    )
    .expect("decode");

    assert_eq!(cell_offset(4, 0, 6), 100);
    assert_eq!(decoded.id_at(5, 100), 0xABCDE);
    assert_eq!(decoded.meta_at(5, 100), 0xFED);
    assert_eq!(decoded.biome_at(2 * 16 + 1), 0x1234);
    assert_eq!(decoded.id_at(3, 4095), 1);
}

#[test]
fn test_colour_text_parse() {
    let mut table = BlockColourTable::new(SchemaConfig::vanilla());
    let summary = table.load_from_str(
        "block 37 * 60ffff00\n\
         blocktype 2 * grass\n\
         biome 4 0000ff 55aa33 88cc44\n",
    );
    assert_eq!(summary.skipped, 0);

    for meta in 0..16 {
        assert_eq!(table.colour(37, meta), 0x60FF_FF00);
        assert_eq!(table.block_type(2, meta), BlockType::Grass);
    }
    assert_eq!(table.biome_colour(block_and_meta(2, 0), 4), 0x55AA33);
}

#[test]
fn test_empty_table_emits_prelude_only() {
    let table = BlockColourTable::new(SchemaConfig::vanilla());
    assert_eq!(table.to_text(), "biome * ffffff ffffff ffffff\nblock * * 00000000\n");
}

#[test]
fn test_save_on_eviction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let queue = Arc::new(RecordingQueue::default());
    let manager = ChunkManager::new(settings(1, 4), queue.clone(), outputs(dir.path(), SchemaConfig::vanilla()));

    let a = ChunkPos::new(0, 0, 0);
    let far = [ChunkPos::new(10, 0, 0), ChunkPos::new(0, -10, 0), ChunkPos::new(7, 7, 0)];
    manager.add_chunk(solid_chunk(a));
    for pos in far {
        manager.add_chunk(solid_chunk(pos));
    }

    for tick in surface_ticks().take(4) {
        manager.on_tick(tick, PlayerPos::new(8, 8, 0));
    }
    manager.remove_chunk(a);
    for pos in far {
        manager.remove_chunk(pos);
    }

    assert_eq!(queue.count(TaskKind::SaveChunk), 1);
    assert_eq!(queue.positions(TaskKind::SaveChunk), vec![a]);
}

#[test]
fn test_underground_batching() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = Arc::new(RecordingUnderground::default());
    let mut out = outputs(dir.path(), SchemaConfig::vanilla());
    out.underground = Some(sink.clone());
    let manager = ChunkManager::new(settings(30, 64), InlineQueue, out);

    let center = ChunkPos::new(10, 20, 0);
    let empty = center.offset(1, 0);
    for z in -1..=1 {
        for x in -1..=1 {
            let pos = center.offset(x, z);
            if pos == empty {
                manager.add_chunk(Arc::new(MemoryChunk::new(pos, SchemaConfig::vanilla())));
            } else if (x, z) != (-1, 1) {
                manager.add_chunk(solid_chunk(pos));
            }
        }
    }
    manager.add_chunk(solid_chunk(ChunkPos::new(10, 20, -1)));

    manager.on_tick(32, PlayerPos::new(165, 330, 0));

    let batches = sink.batches.lock();
    assert_eq!(batches.len(), 1);
    let (got_center, slots) = &batches[0];
    assert_eq!(*got_center, center);
    for z in 0..3 {
        for x in 0..3 {
            let pos = center.offset(x - 1, z - 1);
            let expected = (pos != empty && (x, z) != (0, 2)).then_some(pos);
            assert_eq!(slots[(z * 3 + x) as usize], expected, "slot ({x}, {z})");
        }
    }
}

#[test]
fn test_saves_reach_the_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let schema = SchemaConfig::vanilla();
    let store = NbtDirectoryStore::new(dir.path(), schema);
    let manager = ChunkManager::new(settings(8, 64), InlineQueue, outputs(dir.path(), schema));

    let pos = ChunkPos::new(-1, 2, 0);
    manager.add_chunk(solid_chunk(pos));
    manager.on_tick(1, PlayerPos::new(0, 0, 0));
    manager.close();

    let path = store.chunk_path(pos);
    assert!(path.exists());
    let bytes = std::fs::read(path).expect("read chunk");
    let snapshot = ChunkSnapshot::decode(&bytes, 0, &schema).expect("decode");
    assert_eq!(snapshot.pos(), pos);
    assert_eq!(snapshot.id_at(4, 0), 1);
}

#[derive(Debug, Clone)]
enum Op {
    Add(i32, i32),
    Remove(usize),
    Tick,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (-6..6i32, -6..6i32).prop_map(|(x, z)| Op::Add(x, z)),
        1 => (0..64usize).prop_map(Op::Remove),
        2 => Just(Op::Tick),
    ]
}

fn apply(
    manager: &ChunkManager<MemoryChunk, Arc<RecordingQueue>>,
    ops: &[Op],
    ticks: &mut impl Iterator<Item = u64>,
    tracked: &mut Vec<ChunkPos>,
) {
    for op in ops {
        match *op {
            Op::Add(x, z) => {
                let pos = ChunkPos::new(x, z, 0);
                manager.add_chunk(solid_chunk(pos));
                if !tracked.contains(&pos) {
                    tracked.push(pos);
                }
            }
            Op::Remove(i) if !tracked.is_empty() => {
                let pos = tracked.remove(i % tracked.len());
                manager.remove_chunk(pos);
            }
            Op::Remove(_) => {}
            Op::Tick => manager.on_tick(ticks.next().unwrap_or(1), PlayerPos::new(0, 0, 0)),
        }
    }
}

proptest! {
    #[test]
    fn prop_round_robin_fairness(ops in prop::collection::vec(op(), 0..60), per_tick in 1..8usize) {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = Arc::new(RecordingQueue::default());
        let manager = ChunkManager::new(
            settings(per_tick, i64::MAX),
            queue.clone(),
            outputs(dir.path(), SchemaConfig::vanilla()),
        );
        let mut ticks = surface_ticks();
        let mut tracked = Vec::new();
        apply(&manager, &ops, &mut ticks, &mut tracked);
        prop_assert_eq!(manager.tracked_len(), tracked.len());

        queue.clear();
        let rounds = tracked.len().div_ceil(per_tick);
        for tick in ticks.by_ref().take(rounds) {
            manager.on_tick(tick, PlayerPos::new(0, 0, 0));
        }
        let visited: HashSet<ChunkPos> =
            queue.positions(TaskKind::UpdateSurfaceChunks).into_iter().collect();
        for pos in &tracked {
            prop_assert!(visited.contains(pos), "{} not visited", pos);
        }
    }

    #[test]
    fn prop_one_save_per_viewed_chunk(ops in prop::collection::vec(op(), 0..60), radius_sq in 0..40i64) {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = Arc::new(RecordingQueue::default());
        let manager = ChunkManager::new(
            settings(3, radius_sq),
            queue.clone(),
            outputs(dir.path(), SchemaConfig::vanilla()),
        );
        let mut ticks = surface_ticks();
        let mut tracked = Vec::new();
        apply(&manager, &ops, &mut ticks, &mut tracked);

        queue.clear();
        let viewed: Vec<ChunkPos> = tracked
            .iter()
            .copied()
            .filter(|p| manager.flags(*p).is_some_and(|f| f & VIEWED != 0))
            .collect();
        for pos in &tracked {
            manager.remove_chunk(*pos);
        }

        let mut saved = queue.positions(TaskKind::SaveChunk);
        saved.sort();
        let mut expected = viewed;
        expected.sort();
        prop_assert_eq!(saved, expected);
    }
}

//! The emerge pipeline: a pool of worker threads that turn block requests
//! into loaded or freshly generated map data.
//!
//! Requests deduplicate by position; requests landing inside a chunk that
//! another worker is already generating coalesce onto that generation and
//! share its completion. The queue is bounded: when it stays full past the
//! caller's patience, the oldest not-yet-started request is dropped and
//! its requester notified, so a stalling consumer can never wedge the
//! producers.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, trace, warn};
use tokio::sync::mpsc::UnboundedSender;
use voxen_core::BlockPos;

use crate::light;
use crate::map::{Map, MapEditEvent, MapEditEventType};
use crate::mapgen::{BlockMakeData, Mapgen, chunk_bounds_for_block};
use crate::vmanip::MMVManip;

/// Back-pressure failures of the enqueue call.
#[derive(thiserror::Error, Debug)]
pub enum EmergeError {
    /// The queue stayed full for the whole wait and nothing could be
    /// evicted to make room.
    #[error("emerge queue is full")]
    QueueFull,
    /// The manager is shutting down.
    #[error("emerge manager is shut down")]
    ShutDown,
}

/// One emerge request.
#[derive(Clone, Debug)]
pub struct EmergeRequest {
    /// Echoed back in the completion so callers can route it.
    pub requester: u32,
    /// The block being asked for.
    pub pos: BlockPos,
    /// Whether generation may run if the database has nothing.
    pub allow_generate: bool,
    /// Optional cancellation token; checked before generation and again
    /// before the completion is posted.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl EmergeRequest {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|token| token.load(Ordering::Relaxed))
    }
}

/// How a request ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmergeOutcome {
    /// The block came from the database.
    Loaded,
    /// The block was produced by the map generator.
    Generated,
    /// The request was dropped: out of bounds, not generatable, or evicted
    /// by back-pressure.
    Dropped,
    /// The cancellation token fired.
    Cancelled,
}

/// Posted to the completion channel for every finished request.
#[derive(Clone, Debug)]
pub struct EmergeCompletion {
    /// Copied from the request.
    pub requester: u32,
    /// Copied from the request.
    pub pos: BlockPos,
    /// How it ended.
    pub outcome: EmergeOutcome,
    /// Every block the action touched (chunk blocks, relit neighbours).
    pub modified_blocks: Vec<BlockPos>,
}

struct QueueState {
    fifo: VecDeque<EmergeRequest>,
    queued: HashSet<BlockPos>,
    /// chunk min-block → requests waiting for that chunk's generation
    in_progress: HashMap<BlockPos, Vec<EmergeRequest>>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    work_available: Condvar,
    space_available: Condvar,
    capacity: usize,
    completions: UnboundedSender<EmergeCompletion>,
}

impl Shared {
    fn complete(&self, request: &EmergeRequest, outcome: EmergeOutcome, modified: Vec<BlockPos>) {
        let completion = EmergeCompletion {
            requester: request.requester,
            pos: request.pos,
            outcome,
            modified_blocks: modified,
        };
        if self.completions.send(completion).is_err() {
            trace!("emerge completion receiver is gone");
        }
    }
}

/// The pipeline itself; owns the worker threads.
pub struct EmergeManager {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<Result<()>>>,
}

impl EmergeManager {
    /// Spawns one worker per provided mapgen instance. Every worker needs
    /// its own instance (generation state is per-thread scratch); build
    /// them from the same parameters to keep the output deterministic.
    #[must_use]
    pub fn new(
        map: Arc<RwLock<Map>>,
        mapgens: Vec<Box<dyn Mapgen>>,
        completions: UnboundedSender<EmergeCompletion>,
        queue_capacity: usize,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                fifo: VecDeque::new(),
                queued: HashSet::new(),
                in_progress: HashMap::new(),
                shutdown: false,
            }),
            work_available: Condvar::new(),
            space_available: Condvar::new(),
            capacity: queue_capacity.max(1),
            completions,
        });

        let workers = mapgens
            .into_iter()
            .enumerate()
            .map(|(index, mapgen)| {
                let shared = Arc::clone(&shared);
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    Worker {
                        index,
                        map,
                        mapgen,
                        shared,
                    }
                    .run()
                    .inspect_err(|run_error| {
                        error!("emerge worker {index} exited with error: {run_error}");
                    })
                })
            })
            .collect();

        Self { shared, workers }
    }

    /// Enqueues a request, waiting up to `timeout` for queue space. When
    /// the wait expires, the oldest not-yet-started request is dropped
    /// (its requester is notified with [`EmergeOutcome::Dropped`]) to make
    /// room.
    ///
    /// # Errors
    /// [`EmergeError::QueueFull`] when no room could be made,
    /// [`EmergeError::ShutDown`] after shutdown.
    ///
    /// # Panics
    /// Panics if the internal queue mutex was poisoned by a crashed
    /// worker.
    pub fn request_block(
        &self,
        request: EmergeRequest,
        timeout: Duration,
    ) -> Result<(), EmergeError> {
        #[expect(clippy::expect_used, reason = "a poisoned queue mutex is unrecoverable")]
        let mut state = self.shared.state.lock().expect("emerge queue poisoned");
        if state.shutdown {
            return Err(EmergeError::ShutDown);
        }
        // deduplicate by position
        if state.queued.contains(&request.pos) {
            return Ok(());
        }

        if state.fifo.len() >= self.shared.capacity {
            #[expect(
                clippy::expect_used,
                reason = "a poisoned queue mutex is unrecoverable"
            )]
            let (new_state, wait) = self
                .shared
                .space_available
                .wait_timeout_while(state, timeout, |state| {
                    state.fifo.len() >= self.shared.capacity && !state.shutdown
                })
                .expect("emerge queue poisoned");
            state = new_state;
            if state.shutdown {
                return Err(EmergeError::ShutDown);
            }
            if wait.timed_out() && state.fifo.len() >= self.shared.capacity {
                // make room by dropping the oldest untouched request
                if let Some(evicted) = state.fifo.pop_front() {
                    state.queued.remove(&evicted.pos);
                    warn!("emerge queue full, dropping request for {}", evicted.pos);
                    self.shared
                        .complete(&evicted, EmergeOutcome::Dropped, Vec::new());
                } else {
                    return Err(EmergeError::QueueFull);
                }
            }
        }

        state.queued.insert(request.pos);
        state.fifo.push_back(request);
        drop(state);
        self.shared.work_available.notify_one();
        Ok(())
    }

    /// Number of requests waiting (not counting in-progress generations).
    ///
    /// # Panics
    /// Panics if the internal queue mutex was poisoned.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        #[expect(clippy::expect_used, reason = "a poisoned queue mutex is unrecoverable")]
        let state = self.shared.state.lock().expect("emerge queue poisoned");
        state.fifo.len()
    }

    /// Signals shutdown and joins every worker.
    pub fn shutdown(mut self) {
        self.signal_shutdown();
        for worker in self.workers.drain(..) {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(run_error)) => debug!("worker finished with error: {run_error}"),
                Err(_) => error!("a worker panicked"),
            }
        }
    }

    fn signal_shutdown(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.shutdown = true;
        }
        self.shared.work_available.notify_all();
        self.shared.space_available.notify_all();
    }
}

impl Drop for EmergeManager {
    fn drop(&mut self) {
        self.signal_shutdown();
    }
}

struct Worker {
    index: usize,
    map: Arc<RwLock<Map>>,
    mapgen: Box<dyn Mapgen>,
    shared: Arc<Shared>,
}

impl Worker {
    fn run(&mut self) -> Result<()> {
        loop {
            let request = {
                let mut state = self
                    .shared
                    .state
                    .lock()
                    .map_err(|_| anyhow::anyhow!("emerge queue poisoned"))?;
                loop {
                    if state.shutdown {
                        return Ok(());
                    }
                    if let Some(request) = state.fifo.pop_front() {
                        state.queued.remove(&request.pos);
                        break request;
                    }
                    state = self
                        .shared
                        .work_available
                        .wait(state)
                        .map_err(|_| anyhow::anyhow!("emerge queue poisoned"))?;
                }
            };
            self.shared.space_available.notify_one();
            self.handle(&request);
        }
    }

    fn handle(&mut self, request: &EmergeRequest) {
        if request.cancelled() {
            self.shared
                .complete(request, EmergeOutcome::Cancelled, Vec::new());
            return;
        }

        // bounds check before anything is allocated
        let within_limit = {
            let map = match self.map.read() {
                Ok(map) => map,
                Err(_) => return,
            };
            request.pos.is_within_limit(map.mapgen_limit())
        };
        if !within_limit {
            trace!(
                "emerge worker {}: {} is outside the generation limit",
                self.index, request.pos
            );
            self.shared
                .complete(request, EmergeOutcome::Dropped, Vec::new());
            return;
        }

        // fast path: the database already has the block
        match self.try_load(request) {
            Ok(Some(modified)) => {
                self.shared
                    .complete(request, EmergeOutcome::Loaded, modified);
                return;
            }
            Ok(None) => {}
            Err(load_error) => {
                warn!(
                    "emerge worker {}: loading {} failed: {load_error}",
                    self.index, request.pos
                );
            }
        }

        if !request.allow_generate {
            self.shared
                .complete(request, EmergeOutcome::Dropped, Vec::new());
            return;
        }
        if request.cancelled() {
            self.shared
                .complete(request, EmergeOutcome::Cancelled, Vec::new());
            return;
        }

        self.generate_chunk(request);
    }

    /// Tries the database; returns the touched blocks on a hit.
    fn try_load(&self, request: &EmergeRequest) -> Result<Option<Vec<BlockPos>>> {
        let mut map = self
            .map
            .write()
            .map_err(|_| anyhow::anyhow!("map lock poisoned"))?;
        let present = map
            .get_block_no_create(request.pos)
            .is_some_and(|block| !block.is_dummy() && block.generated);
        if !present {
            if !map.load_block(request.pos)? {
                return Ok(None);
            }
            let freshly_loaded = map
                .get_block_no_create(request.pos)
                .is_some_and(|block| !block.is_dummy() && block.generated);
            if !freshly_loaded {
                return Ok(None);
            }
        }
        // stitch lighting towards already-loaded neighbours
        let mut modified = vec![request.pos];
        light::update_block_border_lighting(&mut map, request.pos, &mut modified);
        modified.sort_unstable();
        modified.dedup();
        Ok(Some(modified))
    }

    fn generate_chunk(&mut self, request: &EmergeRequest) {
        let chunksize = self.mapgen.params().chunksize;
        let (chunk_min, chunk_max) = chunk_bounds_for_block(request.pos, chunksize);

        // coalesce with a generation already running for this chunk
        {
            #[expect(
                clippy::expect_used,
                reason = "a poisoned queue mutex is unrecoverable"
            )]
            let mut state = self.shared.state.lock().expect("emerge queue poisoned");
            if let Some(pending) = state.in_progress.get_mut(&chunk_min) {
                pending.push(request.clone());
                return;
            }
            state.in_progress.insert(chunk_min, Vec::new());
        }

        let halo = glam::I16Vec3::ONE;
        let emerge_min = chunk_min
            .checked_add(-halo)
            .unwrap_or(chunk_min);
        let emerge_max = chunk_max.checked_add(halo).unwrap_or(chunk_max);

        let mut data = BlockMakeData {
            vmanip: MMVManip::new(emerge_min, emerge_max),
            blockpos_min: chunk_min,
            blockpos_max: chunk_max,
            liquid_positions: Vec::new(),
        };

        // populate the buffer under a short write lock
        if let Ok(mut map) = self.map.write() {
            data.vmanip
                .initial_emerge(&mut map, emerge_min, emerge_max, true);
        }

        // the expensive part runs without any lock
        self.mapgen.make_chunk(&mut data);

        let mut modified = Vec::new();
        if let Ok(mut map) = self.map.write() {
            data.vmanip.blit_back_all(&mut map, &mut modified, false);

            // the chunk proper is now generated; the halo stays tentative
            let water_level = self.mapgen.params().water_level;
            for z in chunk_min.vec().z..=chunk_max.vec().z {
                for y in chunk_min.vec().y..=chunk_max.vec().y {
                    for x in chunk_min.vec().x..=chunk_max.vec().x {
                        let Some(block_pos) =
                            BlockPos::new(glam::I16Vec3::new(x, y, z))
                        else {
                            continue;
                        };
                        if let Some(block) = map.get_block_mut(block_pos) {
                            block.generated = true;
                            block.lighting_complete = true;
                            block.underground =
                                block_pos.max_node().0.y < water_level;
                        }
                    }
                }
            }

            for pos in data.liquid_positions.drain(..) {
                map.enqueue_liquid(pos);
            }

            modified.sort_unstable();
            modified.dedup();
            map.dispatch_event(&MapEditEvent {
                event_type: MapEditEventType::Other,
                pos: chunk_min.min_node(),
                node: voxen_core::MapNode::IGNORE,
                modified_blocks: modified.clone(),
            });
        }

        // deliver to the original requester plus everyone who coalesced
        let pending = {
            #[expect(
                clippy::expect_used,
                reason = "a poisoned queue mutex is unrecoverable"
            )]
            let mut state = self.shared.state.lock().expect("emerge queue poisoned");
            state.in_progress.remove(&chunk_min).unwrap_or_default()
        };

        let outcome = if request.cancelled() {
            EmergeOutcome::Cancelled
        } else {
            EmergeOutcome::Generated
        };
        self.shared.complete(request, outcome, modified.clone());
        for coalesced in pending {
            let outcome = if coalesced.cancelled() {
                EmergeOutcome::Cancelled
            } else {
                EmergeOutcome::Generated
            };
            self.shared.complete(&coalesced, outcome, modified.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biome::BiomeManager;
    use crate::database::MemoryDatabase;
    use crate::map::Map;
    use crate::mapgen::{DecoManager, MapgenEnv, MapgenParams, OreManager, create_mapgen};
    use crate::settings::Settings;
    use std::sync::Arc;
    use voxen_core::{ContentFeatures, NodeRegistry};

    fn test_env() -> MapgenEnv {
        let mut registry = NodeRegistry::new();
        registry
            .register_node(ContentFeatures {
                is_ground_content: true,
                ..ContentFeatures::simple("base:stone")
            })
            .unwrap();
        registry
            .register_node(ContentFeatures {
                liquid_kind: voxen_core::LiquidKind::Source,
                liquid_alternative_source: Some("base:water_source".into()),
                liquid_alternative_flowing: Some("base:water_source".into()),
                walkable: false,
                light_propagates: true,
                is_ground_content: true,
                ..ContentFeatures::simple("base:water_source")
            })
            .unwrap();
        registry.register_alias("mapgen_stone", "base:stone").unwrap();
        registry
            .register_alias("mapgen_water_source", "base:water_source")
            .unwrap();
        registry.finalize().unwrap();
        MapgenEnv {
            registry: Arc::new(registry),
            biomes: Arc::new(BiomeManager::new()),
            ores: Arc::new(OreManager::new()),
            decorations: Arc::new(DecoManager::new()),
        }
    }

    fn manager_with(
        settings: &Settings,
        workers: usize,
    ) -> (
        EmergeManager,
        Arc<RwLock<Map>>,
        tokio::sync::mpsc::UnboundedReceiver<EmergeCompletion>,
    ) {
        let env = test_env();
        let params = MapgenParams::from_settings(settings);
        let map = Arc::new(RwLock::new(Map::new(
            Arc::clone(&env.registry),
            Some(Box::new(MemoryDatabase::new())),
            settings,
        )));
        let mapgens = (0..workers)
            .map(|_| create_mapgen(&env, params.clone(), settings).unwrap())
            .collect();
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        let manager = EmergeManager::new(Arc::clone(&map), mapgens, sender, 64);
        (manager, map, receiver)
    }

    fn wait_for_completion(
        receiver: &mut tokio::sync::mpsc::UnboundedReceiver<EmergeCompletion>,
    ) -> EmergeCompletion {
        let deadline = std::time::Instant::now() + Duration::from_secs(60);
        loop {
            if let Ok(completion) = receiver.try_recv() {
                return completion;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "no completion within a minute"
            );
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn generation_produces_a_generated_block() {
        let mut settings = Settings::new();
        settings.set("seed", 42);
        settings.set("mg_name", "flat");
        let (manager, map, mut receiver) = manager_with(&settings, 1);

        manager
            .request_block(
                EmergeRequest {
                    requester: 7,
                    pos: BlockPos::ZERO,
                    allow_generate: true,
                    cancel: None,
                },
                Duration::from_secs(1),
            )
            .unwrap();

        let completion = wait_for_completion(&mut receiver);
        assert_eq!(completion.requester, 7);
        assert_eq!(completion.outcome, EmergeOutcome::Generated);
        assert!(!completion.modified_blocks.is_empty());

        {
            let map = map.read().unwrap();
            let block = map.get_block_no_create(BlockPos::ZERO).unwrap();
            assert!(block.generated);
        }
        manager.shutdown();
    }

    #[test]
    fn out_of_bounds_request_is_dropped_without_allocation() {
        let mut settings = Settings::new();
        settings.set("mapgen_limit", 8000);
        settings.set("mg_name", "flat");
        let (manager, map, mut receiver) = manager_with(&settings, 1);

        // node (10000, 10000, 10000) lies in block (625, 625, 625)
        let far = voxen_core::NodePos::new(10_000, 10_000, 10_000).block_pos();
        manager
            .request_block(
                EmergeRequest {
                    requester: 1,
                    pos: far,
                    allow_generate: true,
                    cancel: None,
                },
                Duration::from_secs(1),
            )
            .unwrap();

        let completion = wait_for_completion(&mut receiver);
        assert_eq!(completion.outcome, EmergeOutcome::Dropped);
        assert!(completion.modified_blocks.is_empty());
        assert!(
            !map.read().unwrap().has_block(far),
            "no block may be allocated for an out-of-bounds request"
        );
    }

    #[test]
    fn cancelled_request_never_generates() {
        let mut settings = Settings::new();
        settings.set("mg_name", "flat");
        let (manager, map, mut receiver) = manager_with(&settings, 1);

        let token = Arc::new(AtomicBool::new(true));
        manager
            .request_block(
                EmergeRequest {
                    requester: 2,
                    pos: BlockPos::ZERO,
                    allow_generate: true,
                    cancel: Some(token),
                },
                Duration::from_secs(1),
            )
            .unwrap();

        let completion = wait_for_completion(&mut receiver);
        assert_eq!(completion.outcome, EmergeOutcome::Cancelled);
        assert!(!map.read().unwrap().has_block(BlockPos::ZERO));
    }

    #[test]
    fn generation_is_deterministic_across_managers() {
        let mut settings = Settings::new();
        settings.set("seed", 1234);
        settings.set("mg_name", "v7");

        let collect_nodes = || {
            let (manager, map, mut receiver) = manager_with(&settings, 2);
            manager
                .request_block(
                    EmergeRequest {
                        requester: 0,
                        pos: BlockPos::ZERO,
                        allow_generate: true,
                        cancel: None,
                    },
                    Duration::from_secs(1),
                )
                .unwrap();
            let completion = wait_for_completion(&mut receiver);
            assert_eq!(completion.outcome, EmergeOutcome::Generated);
            let map = map.read().unwrap();
            let block = map.get_block_no_create(BlockPos::ZERO).unwrap();
            block.nodes().unwrap().0.to_vec()
        };

        let first = collect_nodes();
        let second = collect_nodes();
        assert_eq!(first.len(), second.len());
        assert!(
            first == second,
            "two runs with the same seed must produce byte-identical blocks"
        );
    }
}

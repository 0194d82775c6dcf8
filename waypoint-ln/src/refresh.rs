//! The distance-cache refresher.
//!
//! A cooperative Dijkstra driver over the channel graph, keyed by channel
//! cost. It rewrites the inactive slot of the distance cache from the
//! local-node landmark, time-sliced against the event loop: the long-running
//! sweep must never starve timer callbacks and RPC dispatch.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::{sync::watch, time::Instant};
use tracing::{debug, info, warn};
use waypoint_common::{ln::node_id::NodeId, task::Task, time::DisplayMs};

use crate::{
    constants,
    coster::Coster,
    dhc::{DistanceCache, MAX_DISTANCE},
    graph::NetworkGraph,
    heap::MinHeap,
};

/// Tunables for the refresher. The defaults match production behavior; tests
/// shrink the times.
#[derive(Copy, Clone, Debug)]
pub struct RefreshConfig {
    /// The cost metric for this and subsequent refresh cycles.
    pub coster: Coster,
    /// How long a deferred trigger waits, giving gossip time to catch up
    /// with a new block.
    pub defer_time: Duration,
    /// Wall-clock budget per wake.
    pub work_budget: Duration,
    /// Sleep installed when the budget is exhausted.
    pub sleep_time: Duration,
    /// Loop iterations between budget checks.
    pub iterations_per_wake: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            coster: Coster::default(),
            defer_time: constants::DEFAULT_REFRESH_DEFER_TIME,
            work_budget: constants::REFRESH_WORK_BUDGET,
            sleep_time: constants::REFRESH_SLEEP_TIME,
            iterations_per_wake: constants::REFRESH_ITERATIONS_PER_WAKE,
        }
    }
}

#[derive(Default)]
struct TriggerState {
    /// Whether a refresh process is currently installed.
    running: bool,
    /// A pending deferred-trigger timer, if any.
    deferred: Option<Task<()>>,
}

struct LandmarkMissing;

struct RefreshStats {
    visited: u64,
}

/// Drives refresh cycles of a [`DistanceCache`] from a fixed landmark (the
/// local node).
pub struct DhcRefresher {
    graph: Arc<NetworkGraph>,
    dhc: Arc<DistanceCache>,
    landmark: NodeId,
    config: RefreshConfig,
    state: Mutex<TriggerState>,
    /// The coster captured from the refresh cycle that produced the current
    /// reader slot.
    reader_coster: Mutex<Coster>,
    refreshed_tx: watch::Sender<u64>,
    refreshed_rx: watch::Receiver<u64>,
}

impl DhcRefresher {
    pub fn new(
        graph: Arc<NetworkGraph>,
        dhc: Arc<DistanceCache>,
        landmark: NodeId,
        config: RefreshConfig,
    ) -> Arc<Self> {
        let (refreshed_tx, refreshed_rx) = watch::channel(0);
        Arc::new(Self {
            graph,
            dhc,
            landmark,
            config,
            state: Mutex::new(TriggerState::default()),
            reader_coster: Mutex::new(config.coster),
            refreshed_tx,
            refreshed_rx,
        })
    }

    /// The coster associated with the current reader slot. Only meaningful
    /// once the cache is available.
    pub fn reader_coster(&self) -> Coster {
        *self.reader_coster.lock().expect("refresher lock poisoned")
    }

    /// A receiver yielding the cache generation after each completed
    /// refresh. Await `changed()` to observe the next flip.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.refreshed_rx.clone()
    }

    /// Start a refresh now. Cancels any pending deferred trigger; a no-op if
    /// a refresh is already running.
    pub fn immediate_trigger(self: &Arc<Self>) {
        let mut state = self.state.lock().expect("refresher lock poisoned");
        if let Some(deferred) = state.deferred.take() {
            deferred.abort();
        }
        if state.running {
            debug!("Refresh already running; immediate trigger is a no-op");
            return;
        }
        state.running = true;
        drop(state);

        let this = self.clone();
        Task::spawn("(dhc-refresh)", async move { this.run().await })
            .detach();
    }

    /// Schedule a refresh after `defer_time`. Intended to be called once per
    /// new block; a no-op if a refresh or deferred trigger is already
    /// pending.
    pub fn deferred_trigger(self: &Arc<Self>) {
        let mut state = self.state.lock().expect("refresher lock poisoned");
        if state.running || state.deferred.is_some() {
            return;
        }

        let this = self.clone();
        let defer_time = self.config.defer_time;
        state.deferred = Some(Task::spawn("(dhc-refresh-defer)", async move {
            tokio::time::sleep(defer_time).await;
            this.state
                .lock()
                .expect("refresher lock poisoned")
                .deferred = None;
            this.immediate_trigger();
        }));
    }

    async fn run(self: Arc<Self>) {
        let start = Instant::now();
        let result = self.refresh_cycle().await;

        self.state
            .lock()
            .expect("refresher lock poisoned")
            .running = false;

        match result {
            Ok(stats) => {
                self.dhc.flip();
                // Publish the coster this cycle priced channels with; it now
                // describes the reader slot.
                *self.reader_coster.lock().expect("refresher lock poisoned") =
                    self.config.coster;

                let generation = self.dhc.generation();
                self.refreshed_tx.send_replace(generation);

                let visited = stats.visited;
                let elapsed = DisplayMs(start.elapsed());
                info!(%generation, %visited, "Distance cache refreshed <{elapsed}>");
            }
            Err(LandmarkMissing) => {
                warn!("Local node not in graph yet; deferring refresh");
                self.deferred_trigger();
            }
        }
    }

    /// One full Dijkstra sweep into the writer slot.
    async fn refresh_cycle(&self) -> Result<RefreshStats, LandmarkMissing> {
        let coster = self.config.coster;
        let writer = self.dhc.writer();

        let landmark =
            self.graph.node(&self.landmark).ok_or(LandmarkMissing)?;
        writer.clear_all(&self.graph);
        writer.set_distance(&landmark, 0);
        writer.mark_visited(&landmark);

        let mut queue = MinHeap::with_capacity(self.graph.node_count());
        queue.push(self.landmark, 0);

        let mut visited = 0u64;
        let mut iterations = 0u32;
        let mut budget_start = Instant::now();

        while let Some((priority, node_id)) = queue.pop_min() {
            iterations += 1;
            if iterations >= self.config.iterations_per_wake {
                iterations = 0;
                if budget_start.elapsed() >= self.config.work_budget {
                    tokio::time::sleep(self.config.sleep_time).await;
                    budget_start = Instant::now();
                }
            }

            // Gossip may have forgotten the node since it was pushed.
            let Some(node) = self.graph.node(&node_id) else {
                continue;
            };
            let dist = writer.distance(&node);
            if priority > dist {
                // Stale entry: the node was re-pushed with a better
                // distance. No decrease-key, so just skip.
                continue;
            }
            visited += 1;

            for channel in node.channels() {
                if !channel.active() {
                    continue;
                }
                let Some(neighbor) = self.graph.node(&channel.destination)
                else {
                    continue;
                };

                let cost = coster.cost(&channel).msat();
                let next = u64::from(dist)
                    .saturating_add(cost)
                    .min(u64::from(MAX_DISTANCE));
                let next = u32::try_from(next).expect("clamped to 31 bits");

                if !writer.visited(&neighbor)
                    || writer.distance(&neighbor) > next
                {
                    writer.mark_visited(&neighbor);
                    writer.set_distance(&neighbor, next);
                    queue.push(channel.destination, next);
                }
            }
        }

        Ok(RefreshStats { visited })
    }
}

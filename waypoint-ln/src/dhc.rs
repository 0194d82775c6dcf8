//! A differential-heuristic distance cache.
//!
//! For a fixed landmark L (the local node) and cached distances `d(x, L)`,
//! the heuristic `h(n, g) = |d(n, L) - d(g, L)|` is admissible and consistent
//! for a monotone non-negative cost metric, and supplies a best-first search
//! with an O(1) per-node estimate.
//!
//! Distances are double-buffered per node. The refresher is long-running and
//! cooperatively preempted, so it rewrites the *writer* slot while
//! pathfinding reads the opposite slot; a [`flip`] atomically swaps the
//! roles once a refresh completes. Pathfinding therefore never observes a
//! partially-written landmark map.
//!
//! [`flip`]: DistanceCache::flip

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use waypoint_common::ln::node_id::NodeId;

use crate::graph::{GraphNode, NetworkGraph, DIST_FLAG, DIST_MAX};

/// The maximum cacheable distance: 31 bits, the other bit being the
/// reachable flag.
pub const MAX_DISTANCE: u32 = DIST_MAX;

/// The double-buffered distance cache. Holds no per-node data itself; the
/// slots live on the graph nodes.
pub struct DistanceCache {
    /// Which slot the writer currently owns (0 or 1). Readers use the
    /// opposite slot.
    writer_slot: AtomicUsize,
    /// True once the first successful refresh has flipped the buffers.
    available: AtomicBool,
    /// Bumped on every flip; outstanding readers are invalidated.
    generation: AtomicU64,
}

impl DistanceCache {
    pub fn new() -> Self {
        Self {
            writer_slot: AtomicUsize::new(0),
            available: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// True iff at least one successful refresh has flipped the buffers.
    pub fn available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// The current flip generation. A [`DhcReader`] is only valid while the
    /// generation it captured is current.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Atomically swap the writer/reader roles. All outstanding readers and
    /// writers are invalidated; `available()` is true afterwards.
    pub fn flip(&self) {
        self.writer_slot.fetch_xor(1, Ordering::AcqRel);
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.available.store(true, Ordering::Release);
    }

    /// Capture the current reader slot and the landmark-distance of `goal`.
    ///
    /// Returns `None` when no refresh has completed yet, or when the goal is
    /// not in the graph.
    pub fn reader(
        &self,
        graph: &NetworkGraph,
        goal: &NodeId,
    ) -> Option<DhcReader> {
        if !self.available() {
            return None;
        }
        let slot = 1 - self.writer_slot.load(Ordering::Acquire);
        let goal_node = graph.node(goal)?;
        let raw = goal_node.dist_raw(slot);
        Some(DhcReader {
            slot,
            goal_dist: raw & DIST_MAX,
            generation: self.generation(),
        })
    }

    /// Capture the current writer slot.
    pub fn writer(&self) -> DhcWriter {
        DhcWriter {
            slot: self.writer_slot.load(Ordering::Acquire),
        }
    }
}

impl Default for DistanceCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of the reader slot, bound to a goal node.
///
/// A reader is invalidated by any flip: check [`DhcReader::is_valid`] after
/// any suspension point before trusting its answers.
#[derive(Copy, Clone, Debug)]
pub struct DhcReader {
    slot: usize,
    goal_dist: u32,
    generation: u64,
}

impl DhcReader {
    /// Whether the landmark can reach this node (as of the captured
    /// snapshot).
    pub fn reachable(&self, node: &GraphNode) -> bool {
        node.dist_raw(self.slot) & DIST_FLAG != 0
    }

    /// The heuristic distance `|d(node) - d(goal)|`.
    pub fn distance(&self, node: &GraphNode) -> u32 {
        let dist = node.dist_raw(self.slot) & DIST_MAX;
        dist.abs_diff(self.goal_dist)
    }

    /// Whether this snapshot is still current, i.e. no flip has happened
    /// since it was captured.
    pub fn is_valid(&self, dhc: &DistanceCache) -> bool {
        self.generation == dhc.generation()
    }
}

/// A handle on the writer slot, used by the refresher.
#[derive(Copy, Clone, Debug)]
pub struct DhcWriter {
    slot: usize,
}

impl DhcWriter {
    /// Reset every node's writer slot to (unreachable, max). During a
    /// refresh cycle a node stays that way until Dijkstra visits it.
    pub fn clear_all(&self, graph: &NetworkGraph) {
        for node in graph.nodes() {
            node.set_dist_raw(self.slot, DIST_MAX);
        }
    }

    pub fn visited(&self, node: &GraphNode) -> bool {
        node.dist_raw(self.slot) & DIST_FLAG != 0
    }

    pub fn mark_visited(&self, node: &GraphNode) {
        let raw = node.dist_raw(self.slot);
        node.set_dist_raw(self.slot, raw | DIST_FLAG);
    }

    pub fn distance(&self, node: &GraphNode) -> u32 {
        node.dist_raw(self.slot) & DIST_MAX
    }

    /// Set the node's distance, preserving its visited flag. Distances are
    /// clamped to [`MAX_DISTANCE`].
    pub fn set_distance(&self, node: &GraphNode, distance: u32) {
        let distance = distance.min(MAX_DISTANCE);
        let flag = node.dist_raw(self.slot) & DIST_FLAG;
        node.set_dist_raw(self.slot, flag | distance);
    }
}

//! An in-memory view of the gossiped channel graph.
//!
//! The graph is owned and mutated by the gossip ingest (an external
//! collaborator); the routing core only reads it, except for the per-node
//! distance slots which the distance-cache refresher rewrites. Nodes may be
//! forgotten by gossip at any yield point, so everything downstream looks
//! nodes up by id at use time and tolerates misses.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, RwLock,
    },
};

use waypoint_common::ln::{
    amount::Amount,
    node_id::NodeId,
    scid::{Direction, ShortChannelId},
};

/// Reachability flag bit of a packed distance slot.
pub(crate) const DIST_FLAG: u32 = 0x8000_0000;
/// Maximum representable distance (31 bits).
pub(crate) const DIST_MAX: u32 = 0x7fff_ffff;
/// Fresh nodes are (reachable=1, distance=max) in both slots so they never
/// appear unreachable before the first refresh visits them.
pub(crate) const DIST_INIT: u32 = DIST_FLAG | DIST_MAX;

/// A directed half-channel between two nodes.
#[derive(Debug)]
pub struct Channel {
    pub source: NodeId,
    pub destination: NodeId,
    pub scid: ShortChannelId,
    pub direction: Direction,
    /// Base fee for forwarding through this half-channel, in msat.
    pub base_fee_msat: u64,
    /// Proportional fee, parts-per-million.
    pub fee_ppm: u32,
    /// Blocks this node adds to the outgoing timelock.
    pub cltv_delta: u16,
    pub htlc_minimum: Amount,
    pub htlc_maximum: Amount,
    active: AtomicBool,
}

impl Channel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: NodeId,
        destination: NodeId,
        scid: ShortChannelId,
        direction: Direction,
        base_fee_msat: u64,
        fee_ppm: u32,
        cltv_delta: u16,
        htlc_minimum: Amount,
        htlc_maximum: Amount,
    ) -> Self {
        Self {
            source,
            destination,
            scid,
            direction,
            base_fee_msat,
            fee_ppm,
            cltv_delta,
            htlc_minimum,
            htlc_maximum,
            active: AtomicBool::new(true),
        }
    }

    pub fn active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Toggled by gossip `channel_update`s which disable a direction.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }
}

/// A node in the channel graph: an opaque identity, the outgoing
/// half-channels, and the two-slot packed distance pair maintained by the
/// distance cache.
pub struct GraphNode {
    id: NodeId,
    /// Two (reachable-flag | 31-bit distance) slots; which one is the
    /// writer's is tracked by the distance cache, not here.
    dist: [AtomicU32; 2],
    channels: RwLock<Vec<Arc<Channel>>>,
}

impl GraphNode {
    fn new(id: NodeId) -> Self {
        Self {
            id,
            dist: [AtomicU32::new(DIST_INIT), AtomicU32::new(DIST_INIT)],
            channels: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Snapshot of the outgoing half-channels.
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.channels.read().expect("graph lock poisoned").clone()
    }

    pub(crate) fn dist_raw(&self, slot: usize) -> u32 {
        self.dist[slot].load(Ordering::Relaxed)
    }

    pub(crate) fn set_dist_raw(&self, slot: usize, raw: u32) {
        self.dist[slot].store(raw, Ordering::Relaxed);
    }
}

/// The channel graph. Single writer (gossip ingest), many readers.
pub struct NetworkGraph {
    nodes: RwLock<HashMap<NodeId, Arc<GraphNode>>>,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<Arc<GraphNode>> {
        self.nodes
            .read()
            .expect("graph lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().expect("graph lock poisoned").len()
    }

    /// Snapshot of all nodes, e.g. for a writer-slot clear.
    pub fn nodes(&self) -> Vec<Arc<GraphNode>> {
        self.nodes
            .read()
            .expect("graph lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Get or create the node with the given id.
    pub fn insert_node(&self, id: NodeId) -> Arc<GraphNode> {
        let mut nodes = self.nodes.write().expect("graph lock poisoned");
        nodes
            .entry(id)
            .or_insert_with(|| Arc::new(GraphNode::new(id)))
            .clone()
    }

    /// Forget a node. Half-channels from other nodes which point at it are
    /// left in place; their destination lookups will simply miss.
    pub fn remove_node(&self, id: &NodeId) {
        self.nodes.write().expect("graph lock poisoned").remove(id);
    }

    /// Insert a half-channel, creating both endpoint nodes if needed. An
    /// existing half-channel with the same (scid, direction) is replaced.
    pub fn insert_channel(&self, channel: Channel) -> Arc<Channel> {
        let source = self.insert_node(channel.source);
        self.insert_node(channel.destination);

        let channel = Arc::new(channel);
        let mut channels =
            source.channels.write().expect("graph lock poisoned");
        channels.retain(|existing| {
            existing.scid != channel.scid
                || existing.direction != channel.direction
        });
        channels.push(channel.clone());
        channel
    }

    /// Remove a half-channel from its source node's outgoing list.
    pub fn remove_channel(
        &self,
        source: &NodeId,
        scid: ShortChannelId,
        direction: Direction,
    ) {
        if let Some(node) = self.node(source) {
            node.channels
                .write()
                .expect("graph lock poisoned")
                .retain(|existing| {
                    existing.scid != scid || existing.direction != direction
                });
        }
    }
}

impl Default for NetworkGraph {
    fn default() -> Self {
        Self::new()
    }
}

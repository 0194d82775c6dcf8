//! The path-diversity engine.
//!
//! Wraps the external shortest-route finder to produce a *stream* of route
//! alternatives for a destination. Conceptually it walks a tree breadth
//! first: the root is the unconstrained shortest route, and each child of a
//! route bans one of that route's hops (every parallel channel between the
//! hop's endpoints, in both directions) on top of all ancestor bans. Shorter
//! ban-sets are expanded first since they tend to yield shorter paths.
//!
//! Requests to the same destination are serialised: parallel shortest-route
//! calls against an empty queue would all return the identical root route,
//! and the gossip subsystem answering them is effectively serialised anyway.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use tracing::{debug, info};
use waypoint_common::ln::{
    amount::Amount,
    node_id::NodeId,
    scid::Direction,
};

use crate::{
    constants,
    error::CommandError,
    route::{Exclusion, Route},
    rpc::{ChannelQuery, GetRouteRequest, NodeRpc},
};

/// Shared state of one payment attempt. Requests belonging to the same
/// payment share a session; its exclude set accumulates the caller's bans
/// and any budget-repair hints this engine leaves behind.
pub struct PaymentSession {
    /// The payer's node id (used as the source endpoint of first-hop bans).
    pub payer: NodeId,
    /// The amount to deliver.
    pub amount: Amount,
    /// Final CLTV delta for the destination.
    pub final_cltv: u32,
    /// Riskfactor forwarded to the route finder.
    pub riskfactor: u64,
    /// Reject routes whose total fee exceeds this.
    pub fee_budget: Amount,
    /// Reject routes whose first-hop delay exceeds this many blocks.
    pub cltv_budget: u32,
    excludes: Mutex<Vec<Exclusion>>,
}

impl PaymentSession {
    pub fn new(
        payer: NodeId,
        amount: Amount,
        final_cltv: u32,
        fee_budget: Amount,
        cltv_budget: u32,
        excludes: Vec<Exclusion>,
    ) -> Self {
        Self {
            payer,
            amount,
            final_cltv,
            riskfactor: constants::DEFAULT_GETROUTE_RISK_FACTOR,
            fee_budget,
            cltv_budget,
            excludes: Mutex::new(excludes),
        }
    }

    /// Snapshot of the payment's exclude set.
    pub fn excludes(&self) -> Vec<Exclusion> {
        self.excludes.lock().expect("session lock poisoned").clone()
    }

    pub fn add_exclude(&self, exclusion: Exclusion) {
        self.excludes
            .lock()
            .expect("session lock poisoned")
            .push(exclusion);
    }
}

/// A node of the conceptual ban tree. The ban-set of a tree node is the
/// chain of edges from itself to the root; children hold a strong reference
/// to their parent, so a queue's worth of edges keeps all ancestors alive
/// and an edge dropped by every holder releases its parent, possibly
/// cascading.
struct BanEdge {
    source: NodeId,
    destination: NodeId,
    parent: Option<Arc<BanEdge>>,
}

#[derive(Default)]
struct DestState {
    /// Unexpanded tree edges, breadth-first.
    queue: VecDeque<Arc<BanEdge>>,
    /// Routes already emitted in this traversal, compared hop-for-hop.
    cache: Vec<Route>,
}

/// Per-destination context: the tree queue, the route cache, and the FIFO
/// serialiser for concurrent requests.
#[derive(Default)]
struct DiversityDest {
    state: Mutex<DestState>,
    serial: tokio::sync::Mutex<()>,
}

struct DestEntry {
    dest: Arc<DiversityDest>,
    waiters: usize,
}

/// Produces diverse routes per destination by progressively banning edges of
/// previously returned routes.
pub struct DiversityEngine {
    rpc: Arc<dyn NodeRpc>,
    dests: Mutex<HashMap<NodeId, DestEntry>>,
}

impl DiversityEngine {
    pub fn new(rpc: Arc<dyn NodeRpc>) -> Self {
        Self {
            rpc,
            dests: Mutex::new(HashMap::new()),
        }
    }

    /// Produce the next diverse route to `destination` for this payment.
    ///
    /// Concurrent calls for the same destination are served FIFO; calls for
    /// different destinations are independent.
    pub async fn next_route(
        &self,
        session: &PaymentSession,
        destination: NodeId,
    ) -> Result<Route, CommandError> {
        let dest = self.checkout(destination);
        let result = {
            let _serial = dest.serial.lock().await;
            self.run_request(session, destination, &dest).await
        };
        self.checkin(destination);
        result
    }

    /// Register a waiter on the destination, creating its context on first
    /// use.
    fn checkout(&self, destination: NodeId) -> Arc<DiversityDest> {
        let mut dests = self.dests.lock().expect("engine lock poisoned");
        let entry = dests.entry(destination).or_insert_with(|| DestEntry {
            dest: Arc::new(DiversityDest::default()),
            waiters: 0,
        });
        entry.waiters += 1;
        entry.dest.clone()
    }

    /// Release a waiter; the context is destroyed when none remain.
    fn checkin(&self, destination: NodeId) {
        let mut dests = self.dests.lock().expect("engine lock poisoned");
        if let Some(entry) = dests.get_mut(&destination) {
            entry.waiters -= 1;
            if entry.waiters == 0 {
                dests.remove(&destination);
                debug!(%destination, "Dropped idle diversity context");
            }
        }
    }

    async fn run_request(
        &self,
        session: &PaymentSession,
        destination: NodeId,
        dest: &DiversityDest,
    ) -> Result<Route, CommandError> {
        loop {
            let edge = {
                let mut state = dest.state.lock().expect("dest lock poisoned");
                let edge = state.queue.pop_front();
                if edge.is_none() {
                    // Tree restart: the cache only dedupes within one
                    // traversal.
                    state.cache.clear();
                }
                edge
            };

            let mut exclude = session.excludes();
            if let Some(edge) = &edge {
                self.expand_bans(edge, &mut exclude).await?;
            }

            let request = GetRouteRequest {
                id: destination,
                amount_msat: session.amount,
                riskfactor: session.riskfactor,
                cltv: session.final_cltv,
                max_hops: constants::DEFAULT_MAX_HOPS,
                from: None,
                exclude,
            };

            let route = match self.rpc.getroute(&request).await {
                Ok(route) if !route.is_empty() => route,
                result => {
                    if edge.is_some() {
                        // This subtree yields nothing; drop the edge (and
                        // thereby its ban chain) and take the next one.
                        debug!(%destination, "Banned route query failed; trying next edge");
                        continue;
                    }
                    let message = match result {
                        Err(err) => format!("no route found: {}", err.message),
                        Ok(_) => "no route found".to_owned(),
                    };
                    return Err(CommandError::unreachable(
                        message,
                        Some("getroute"),
                    ));
                }
            };

            let duplicate = {
                let state = dest.state.lock().expect("dest lock poisoned");
                state.cache.iter().any(|cached| cached == &route)
            };
            if duplicate {
                debug!(%destination, "Route already emitted; trying next edge");
                continue;
            }

            // Payment-level budgets.
            let fee = route.fee();
            let delay = route.hops[0].delay;
            if fee > session.fee_budget || delay > session.cltv_budget {
                if edge.is_some() {
                    // Deeper tree nodes only yield longer, more expensive
                    // routes; restart the traversal from the root.
                    debug!(%destination, %fee, %delay, "Over budget; restarting traversal");
                    dest.state
                        .lock()
                        .expect("dest lock poisoned")
                        .queue
                        .clear();
                    continue;
                }

                // This was the unconstrained shortest route: the payment
                // cannot fit its budgets. Leave a repair hint in the
                // payment's exclude set.
                let over_fee = fee > session.fee_budget;
                let hint = if over_fee {
                    most_expensive_edge(&route)
                } else {
                    longest_delay_edge(&route)
                };
                session.add_exclude(hint);
                let message = if over_fee {
                    format!("fee {fee} exceeds budget")
                } else {
                    format!("delay {delay} exceeds budget")
                };
                return Err(CommandError::budget_exceeded(message, hint));
            }

            // Success: remember the route and enqueue one child edge per
            // hop, each parented on the edge that produced this route.
            let mut state = dest.state.lock().expect("dest lock poisoned");
            state.cache.push(route.clone());
            let mut prev = session.payer;
            for hop in &route.hops {
                state.queue.push_back(Arc::new(BanEdge {
                    source: prev,
                    destination: hop.id,
                    parent: edge.clone(),
                }));
                prev = hop.id;
            }

            info!(%destination, "Diverse route: {route}");
            return Ok(route);
        }
    }

    /// Expand a tree edge into a concrete ban list by walking its chain up
    /// to the root and, for each link, banning *every* channel between its
    /// endpoints in either direction. Peers frequently have multiple
    /// parallel channels; banning a single channel would not diversify.
    async fn expand_bans(
        &self,
        edge: &Arc<BanEdge>,
        exclude: &mut Vec<Exclusion>,
    ) -> Result<(), CommandError> {
        let mut link = Some(edge.clone());
        while let Some(cur) = link {
            let query = ChannelQuery::from_source(cur.source);
            let channels = self
                .rpc
                .listchannels(&query)
                .await
                .map_err(|err| CommandError::from_rpc(err, "listchannels"))?;

            for channel in channels
                .iter()
                .filter(|channel| channel.destination == cur.destination)
            {
                for dir in Direction::BOTH {
                    let exclusion =
                        Exclusion::channel(channel.short_channel_id, dir);
                    if !exclude.contains(&exclusion) {
                        exclude.push(exclusion);
                    }
                }
            }

            link = cur.parent.clone();
        }
        Ok(())
    }
}

/// The hop whose channel charged the largest fee on this route. Falls back
/// to the first hop for degenerate single-hop routes.
fn most_expensive_edge(route: &Route) -> Exclusion {
    let hops = &route.hops;
    let mut best = 0;
    let mut best_fee = Amount::ZERO;
    for i in 1..hops.len() {
        let fee = hops[i - 1].amount_msat.saturating_sub(hops[i].amount_msat);
        if fee >= best_fee {
            best = i;
            best_fee = fee;
        }
    }
    Exclusion::channel(hops[best].channel, hops[best].direction)
}

/// The hop whose channel added the largest CLTV delta on this route. Falls
/// back to the first hop for degenerate single-hop routes.
fn longest_delay_edge(route: &Route) -> Exclusion {
    let hops = &route.hops;
    let mut best = 0;
    let mut best_delta = 0;
    for i in 1..hops.len() {
        let delta = hops[i - 1].delay.saturating_sub(hops[i].delay);
        if delta >= best_delta {
            best = i;
            best_delta = delta;
        }
    }
    Exclusion::channel(hops[best].channel, hops[best].direction)
}

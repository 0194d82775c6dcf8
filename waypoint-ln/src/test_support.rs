//! Shared test fixtures: a deterministic graph builder, a reference
//! shortest-path implementation, and a scriptable in-memory [`NodeRpc`].

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicU32, AtomicU8, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use waypoint_common::{
    ln::{
        amount::Amount,
        amount_or_all::AmountOrAll,
        features::{self, FeatureBits},
        node_id::NodeId,
        scid::{Direction, ShortChannelId},
    },
    sha256,
};

use crate::{
    coster::Coster,
    error::{code, RpcError},
    graph::{Channel, NetworkGraph},
    route::{add_fee, Exclusion, HopStyle, Route, RouteHop},
    rpc::{
        AccelId, AccelStarted, ChannelId, ChannelInfo, ChannelQuery,
        ConnectResult, DecodedTx, FeeEstimate, FundChannelStartRequest,
        FundChannelStarted, GetInfo, GetRouteRequest, NodeInfo, NodeRpc,
        OutPoint, OutputTarget, PreparedTx, Script, SentTx, TxOutput,
        TxPrepareRequest, Txid,
    },
};

/// A coster with no risk term, so edge costs equal base fees and tests can
/// use round numbers.
pub(crate) fn test_coster() -> Coster {
    Coster {
        sample_amount: Amount::from_msat(100_000_000),
        risk_factor: 0,
    }
}

/// Insert a symmetric edge (both half-channels) with the given base fee and
/// no proportional/CLTV cost.
pub(crate) fn insert_edge(
    graph: &NetworkGraph,
    a: NodeId,
    b: NodeId,
    base_fee_msat: u64,
) {
    let a_tag = u32::from(a.as_slice()[32]);
    let b_tag = u32::from(b.as_slice()[32]);
    let scid = ShortChannelId::new(a_tag.min(b_tag), a_tag.max(b_tag), 0);
    for (src, dst, dir) in
        [(a, b, Direction::Zero), (b, a, Direction::One)]
    {
        graph.insert_channel(Channel::new(
            src,
            dst,
            scid,
            dir,
            base_fee_msat,
            0,
            0,
            Amount::ZERO,
            Amount::MAX,
        ));
    }
}

/// Textbook Dijkstra over the graph under the given coster; the oracle the
/// cache's heuristic is compared against.
pub(crate) fn reference_shortest(
    graph: &NetworkGraph,
    coster: &Coster,
    from: NodeId,
) -> HashMap<NodeId, u64> {
    let mut dist = HashMap::new();
    let mut heap = BinaryHeap::new();
    dist.insert(from, 0u64);
    heap.push(Reverse((0u64, from)));

    while let Some(Reverse((cost, node_id))) = heap.pop() {
        if dist.get(&node_id).copied().unwrap_or(u64::MAX) < cost {
            continue;
        }
        let Some(node) = graph.node(&node_id) else {
            continue;
        };
        for channel in node.channels() {
            let next = cost + coster.cost(&channel).msat();
            let entry =
                dist.entry(channel.destination).or_insert(u64::MAX);
            if next < *entry {
                *entry = next;
                heap.push(Reverse((next, channel.destination)));
            }
        }
    }

    dist
}

// --- MockRpc --- //

/// A builder for one symmetric test channel between two tagged nodes.
pub(crate) struct TestChannel {
    src: u8,
    dst: u8,
    base_fee_msat: u64,
    fee_ppm: u32,
    cltv_delta: u32,
    htlc_minimum: Amount,
    htlc_maximum: Amount,
    scid: Option<ShortChannelId>,
}

impl TestChannel {
    pub fn new(src: u8, dst: u8, base_fee_msat: u64) -> Self {
        Self {
            src,
            dst,
            base_fee_msat,
            fee_ppm: 0,
            cltv_delta: 6,
            htlc_minimum: Amount::ZERO,
            htlc_maximum: Amount::MAX,
            scid: None,
        }
    }

    pub fn with_scid(mut self, scid: ShortChannelId) -> Self {
        self.scid = Some(scid);
        self
    }

    #[allow(dead_code)]
    pub fn with_htlc_bounds(mut self, min: Amount, max: Amount) -> Self {
        self.htlc_minimum = min;
        self.htlc_maximum = max;
        self
    }
}

type GetrouteProbe = Box<dyn Fn(bool) + Send + Sync>;

/// An in-memory scriptable implementation of the collaborator surface:
/// a gossip store with a real shortest-path finder, a toy wallet with
/// reservations, programmable per-peer funding failures, and a canned
/// acceleration backend.
pub(crate) struct MockRpc {
    local: NodeId,
    channels: Mutex<Vec<ChannelInfo>>,
    node_features: Mutex<HashMap<NodeId, FeatureBits>>,
    peer_features: Mutex<HashMap<NodeId, FeatureBits>>,
    calls: Mutex<Vec<String>>,
    getroute_excludes: Mutex<Vec<Vec<Exclusion>>>,
    getroute_probe: Mutex<Option<GetrouteProbe>>,

    balance: Mutex<Amount>,
    prepared: Mutex<HashMap<Txid, DecodedTx>>,
    reserved: Mutex<HashSet<Txid>>,
    prepare_counter: AtomicU8,
    fail_txsend: Mutex<Option<RpcError>>,

    fail_connect: Mutex<HashMap<NodeId, RpcError>>,
    fail_start: Mutex<HashMap<NodeId, RpcError>>,
    fail_complete: Mutex<HashMap<NodeId, RpcError>>,

    blockheight: AtomicU32,

    accel_estimate: Mutex<FeeEstimate>,
    accel_executes: Mutex<VecDeque<Result<FeeEstimate, RpcError>>>,
    executed_fees: Mutex<Vec<Amount>>,
}

fn default_peer_features() -> FeatureBits {
    let mut bits = FeatureBits::empty();
    bits.set_bit(features::VAR_ONION + 1);
    bits.set_bit(features::LARGE_CHANNELS + 1);
    bits
}

impl MockRpc {
    /// The flat fee the toy wallet charges per prepared transaction.
    pub const WALLET_FEE: Amount = Amount::from_sats_u32(1_000);

    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            channels: Mutex::new(Vec::new()),
            node_features: Mutex::new(HashMap::new()),
            peer_features: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            getroute_excludes: Mutex::new(Vec::new()),
            getroute_probe: Mutex::new(None),
            balance: Mutex::new(Amount::ZERO),
            prepared: Mutex::new(HashMap::new()),
            reserved: Mutex::new(HashSet::new()),
            prepare_counter: AtomicU8::new(1),
            fail_txsend: Mutex::new(None),
            fail_connect: Mutex::new(HashMap::new()),
            fail_start: Mutex::new(HashMap::new()),
            fail_complete: Mutex::new(HashMap::new()),
            blockheight: AtomicU32::new(100),
            accel_estimate: Mutex::new(FeeEstimate {
                total_fee: Amount::ZERO,
                delta_fee: Amount::ZERO,
                max_fee: Amount::ZERO,
            }),
            accel_executes: Mutex::new(VecDeque::new()),
            executed_fees: Mutex::new(Vec::new()),
        }
    }

    // --- Scripting --- //

    pub fn add_symmetric_channel(&self, tc: TestChannel) -> ShortChannelId {
        let src = NodeId::for_test(tc.src);
        let dst = NodeId::for_test(tc.dst);
        let scid = tc.scid.unwrap_or_else(|| {
            ShortChannelId::new(u32::from(tc.src), u32::from(tc.dst), 0)
        });

        let mut channels = self.channels.lock().unwrap();
        for (source, destination) in [(src, dst), (dst, src)] {
            let direction = if source < destination {
                Direction::Zero
            } else {
                Direction::One
            };
            channels.push(ChannelInfo {
                source,
                destination,
                short_channel_id: scid,
                direction,
                base_fee_millisatoshi: tc.base_fee_msat,
                fee_per_millionth: tc.fee_ppm,
                delay: tc.cltv_delta,
                htlc_minimum_msat: tc.htlc_minimum,
                htlc_maximum_msat: tc.htlc_maximum,
                active: true,
            });
        }
        drop(channels);

        let mut nodes = self.node_features.lock().unwrap();
        nodes.entry(src).or_insert_with(default_peer_features);
        nodes.entry(dst).or_insert_with(default_peer_features);

        scid
    }

    /// Remove a node from gossip; its channels dangle, as in the real
    /// graph.
    pub fn forget_node(&self, id: NodeId) {
        self.node_features.lock().unwrap().remove(&id);
    }

    pub fn set_peer_features(&self, id: NodeId, features: FeatureBits) {
        self.peer_features.lock().unwrap().insert(id, features);
    }

    pub fn set_wallet_balance(&self, balance: Amount) {
        *self.balance.lock().unwrap() = balance;
    }

    #[allow(dead_code)]
    pub fn fail_connect(&self, id: NodeId, err: RpcError) {
        self.fail_connect.lock().unwrap().insert(id, err);
    }

    pub fn fail_fundchannel_start(&self, id: NodeId, err: RpcError) {
        self.fail_start.lock().unwrap().insert(id, err);
    }

    pub fn fail_fundchannel_complete(&self, id: NodeId, err: RpcError) {
        self.fail_complete.lock().unwrap().insert(id, err);
    }

    pub fn fail_txsend(&self, err: RpcError) {
        *self.fail_txsend.lock().unwrap() = Some(err);
    }

    pub fn set_getroute_probe(
        &self,
        probe: impl Fn(bool) + Send + Sync + 'static,
    ) {
        *self.getroute_probe.lock().unwrap() = Some(Box::new(probe));
    }

    pub fn set_accel_estimate(&self, estimate: FeeEstimate) {
        *self.accel_estimate.lock().unwrap() = estimate;
    }

    pub fn push_accel_execute(
        &self,
        result: Result<FeeEstimate, RpcError>,
    ) {
        self.accel_executes.lock().unwrap().push_back(result);
    }

    // --- Inspection --- //

    pub fn count_calls(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(name))
            .count()
    }

    pub fn reserved_txids(&self) -> Vec<Txid> {
        self.reserved.lock().unwrap().iter().copied().collect()
    }

    pub fn getroute_excludes(&self) -> Vec<Vec<Exclusion>> {
        self.getroute_excludes.lock().unwrap().clone()
    }

    pub fn executed_fees(&self) -> Vec<Amount> {
        self.executed_fees.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    // --- Routing --- //

    /// Cheapest route by total base+proportional fee, honoring exclusions
    /// and HTLC bounds; the stand-in for the external route finder.
    pub fn shortest_route(
        &self,
        from: NodeId,
        destination: NodeId,
        amount: Amount,
        final_cltv: u32,
        exclude: &[Exclusion],
    ) -> Option<Route> {
        let channels = self.channels.lock().unwrap().clone();

        let usable = |channel: &ChannelInfo| {
            channel.active
                && channel.brackets(amount)
                && !exclude.iter().any(|x| {
                    x.excludes_channel(
                        channel.short_channel_id,
                        channel.direction,
                    ) || x.excludes_node(&channel.destination)
                })
        };

        // Dijkstra by fee, tracking the channel into each node.
        let mut best: HashMap<NodeId, (u64, Option<ChannelInfo>)> =
            HashMap::new();
        let mut heap = BinaryHeap::new();
        best.insert(from, (0, None));
        heap.push(Reverse((0u64, from)));

        while let Some(Reverse((cost, node))) = heap.pop() {
            if best.get(&node).map(|(c, _)| *c) != Some(cost) {
                continue;
            }
            if node == destination {
                break;
            }
            for channel in
                channels.iter().filter(|c| c.source == node && usable(c))
            {
                let fee = channel.base_fee_millisatoshi
                    + u64::from(channel.fee_per_millionth)
                        * amount.msat()
                        / 1_000_000;
                let next = cost + fee;
                let entry = best
                    .entry(channel.destination)
                    .or_insert((u64::MAX, None));
                if next < entry.0 {
                    *entry = (next, Some(channel.clone()));
                    heap.push(Reverse((next, channel.destination)));
                }
            }
        }

        // Walk predecessors back from the destination.
        let mut path = VecDeque::new();
        let mut cursor = destination;
        while cursor != from {
            let (_, channel) = best.get(&cursor)?;
            let channel = channel.clone()?;
            cursor = channel.source;
            path.push_front(channel);
        }
        if path.is_empty() {
            return None;
        }

        // Amounts and delays accumulate from the destination backwards:
        // each hop must carry what the next hop delivers plus the fee its
        // forwarding node charges on its outgoing channel.
        let mut hops: Vec<RouteHop> = path
            .iter()
            .map(|channel| RouteHop {
                id: channel.destination,
                channel: channel.short_channel_id,
                direction: channel.direction,
                amount_msat: amount,
                delay: final_cltv,
                style: HopStyle::Tlv,
            })
            .collect();
        for i in (0..hops.len().saturating_sub(1)).rev() {
            let next_channel = &path[i + 1];
            hops[i].amount_msat = add_fee(
                hops[i + 1].amount_msat,
                next_channel.base_fee_millisatoshi,
                next_channel.fee_per_millionth,
            );
            hops[i].delay = hops[i + 1].delay + next_channel.delay;
        }

        Some(Route::new(hops))
    }
}

#[async_trait]
impl NodeRpc for MockRpc {
    async fn getinfo(&self) -> Result<GetInfo, RpcError> {
        self.record("getinfo".into());
        Ok(GetInfo {
            id: self.local,
            blockheight: self.blockheight.load(Ordering::SeqCst),
        })
    }

    async fn listchannels(
        &self,
        query: &ChannelQuery,
    ) -> Result<Vec<ChannelInfo>, RpcError> {
        self.record("listchannels".into());
        let channels = self.channels.lock().unwrap();
        Ok(channels
            .iter()
            .filter(|channel| {
                query.source.map_or(true, |s| channel.source == s)
                    && query
                        .destination
                        .map_or(true, |d| channel.destination == d)
            })
            .cloned()
            .collect())
    }

    async fn listnodes(
        &self,
        id: &NodeId,
    ) -> Result<Option<NodeInfo>, RpcError> {
        self.record("listnodes".into());
        Ok(self.node_features.lock().unwrap().get(id).map(|features| {
            NodeInfo {
                nodeid: *id,
                features: features.clone(),
            }
        }))
    }

    async fn getroute(
        &self,
        req: &GetRouteRequest,
    ) -> Result<Route, RpcError> {
        self.record("getroute".into());
        self.getroute_excludes
            .lock()
            .unwrap()
            .push(req.exclude.clone());

        if let Some(probe) = self.getroute_probe.lock().unwrap().as_ref() {
            probe(true);
        }
        // The real finder is an outbound RPC: always a suspension point.
        tokio::task::yield_now().await;
        let result = self.shortest_route(
            req.from.unwrap_or(self.local),
            req.id,
            req.amount_msat,
            req.cltv,
            &req.exclude,
        );
        if let Some(probe) = self.getroute_probe.lock().unwrap().as_ref() {
            probe(false);
        }

        result.ok_or_else(|| {
            RpcError::new(code::PAY_ROUTE_NOT_FOUND, "Could not find a route")
        })
    }

    async fn connect(&self, id: &NodeId) -> Result<ConnectResult, RpcError> {
        self.record(format!("connect {id}"));
        if let Some(err) = self.fail_connect.lock().unwrap().get(id) {
            return Err(err.clone());
        }
        let features = self
            .peer_features
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_else(default_peer_features);
        Ok(ConnectResult { id: *id, features })
    }

    async fn fundchannel_start(
        &self,
        req: &FundChannelStartRequest,
    ) -> Result<FundChannelStarted, RpcError> {
        self.record(format!("fundchannel_start {id}", id = req.id));
        if let Some(err) = self.fail_start.lock().unwrap().get(&req.id) {
            return Err(err.clone());
        }

        let hash =
            sha256::digest_many(&[b"funding".as_slice(), req.id.as_slice()]);
        let mut script = vec![0x00, 0x14];
        script.extend_from_slice(&hash.as_slice()[..20]);
        Ok(FundChannelStarted {
            funding_address: format!("bcrt1q{hash}"),
            scriptpubkey: Script::new(script),
        })
    }

    async fn fundchannel_complete(
        &self,
        id: &NodeId,
        txid: &Txid,
        _outnum: u32,
    ) -> Result<ChannelId, RpcError> {
        self.record(format!("fundchannel_complete {id}"));
        if let Some(err) = self.fail_complete.lock().unwrap().get(id) {
            return Err(err.clone());
        }
        let hash =
            sha256::digest_many(&[id.as_slice(), txid.as_slice()]);
        Ok(ChannelId::new(hash.to_array()))
    }

    async fn fundchannel_cancel(&self, id: &NodeId) -> Result<(), RpcError> {
        self.record(format!("fundchannel_cancel {id}"));
        Ok(())
    }

    async fn txprepare(
        &self,
        req: &TxPrepareRequest,
    ) -> Result<PreparedTx, RpcError> {
        self.record("txprepare".into());

        let balance = *self.balance.lock().unwrap();
        let mut explicit_sum = Amount::ZERO;
        for output in &req.outputs {
            if let AmountOrAll::Amount(amount) = output.amount {
                explicit_sum = explicit_sum.saturating_add(amount);
            }
        }
        let spent = explicit_sum.saturating_add(Self::WALLET_FEE);
        if spent > balance {
            return Err(RpcError::new(
                code::FUND_CANNOT_AFFORD,
                "Could not afford the requested outputs",
            ));
        }

        let script_for = |target: &OutputTarget| match target {
            OutputTarget::Script(script) => script.clone(),
            OutputTarget::Address(addr) => {
                let hash = sha256::digest(addr.as_bytes());
                let mut script = vec![0x00, 0x14];
                script.extend_from_slice(&hash.as_slice()[..20]);
                Script::new(script)
            }
        };

        let outputs = req
            .outputs
            .iter()
            .map(|output| TxOutput {
                scriptpubkey: script_for(&output.target),
                amount: match output.amount {
                    AmountOrAll::Amount(amount) => amount,
                    AmountOrAll::All => balance - spent,
                },
            })
            .collect();
        let inputs = req.utxos.clone().unwrap_or_else(|| {
            vec![OutPoint {
                txid: Txid::new([0xee; 32]),
                vout: 0,
            }]
        });

        let seq = self.prepare_counter.fetch_add(1, Ordering::SeqCst);
        let txid = Txid::new([seq; 32]);
        let tx = DecodedTx { inputs, outputs };

        self.prepared.lock().unwrap().insert(txid, tx.clone());
        self.reserved.lock().unwrap().insert(txid);

        Ok(PreparedTx { txid, tx })
    }

    async fn txsend(&self, txid: &Txid) -> Result<SentTx, RpcError> {
        self.record(format!("txsend {txid}"));
        if let Some(err) = self.fail_txsend.lock().unwrap().clone() {
            return Err(err);
        }
        self.reserved.lock().unwrap().remove(txid);
        let tx = self
            .prepared
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .unwrap_or_default();
        Ok(SentTx { txid: *txid, tx })
    }

    async fn txdiscard(&self, txid: &Txid) -> Result<(), RpcError> {
        self.record(format!("txdiscard {txid}"));
        self.reserved.lock().unwrap().remove(txid);
        Ok(())
    }

    async fn waitblockheight(
        &self,
        height: u32,
        _timeout: Duration,
    ) -> Result<bool, RpcError> {
        self.record(format!("waitblockheight {height}"));
        self.blockheight.fetch_max(height, Ordering::SeqCst);
        Ok(true)
    }

    async fn txaccelerate_start(
        &self,
        txid: &Txid,
    ) -> Result<AccelStarted, RpcError> {
        self.record(format!("txaccelerate_start {txid}"));
        Ok(AccelStarted {
            txacc_id: AccelId("txacc-1".to_owned()),
            estimate: self.accel_estimate.lock().unwrap().clone(),
        })
    }

    async fn txaccelerate_estimate(
        &self,
        _id: &AccelId,
    ) -> Result<FeeEstimate, RpcError> {
        self.record("txaccelerate_estimate".into());
        Ok(self.accel_estimate.lock().unwrap().clone())
    }

    async fn txaccelerate_execute(
        &self,
        _id: &AccelId,
        total_fee: Amount,
    ) -> Result<FeeEstimate, RpcError> {
        self.record("txaccelerate_execute".into());
        self.executed_fees.lock().unwrap().push(total_fee);

        match self.accel_executes.lock().unwrap().pop_front() {
            Some(Ok(estimate)) => {
                *self.accel_estimate.lock().unwrap() = estimate.clone();
                Ok(estimate)
            }
            Some(Err(err)) => Err(err),
            None => Err(RpcError::new(
                code::ACCEL_ID_NOT_FOUND,
                "Unknown txacc id",
            )),
        }
    }
}

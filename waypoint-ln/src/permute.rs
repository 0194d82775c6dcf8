//! Route repair: splice a two-hop detour around a failed element of an
//! existing route.
//!
//! Given the failing hop index and whether the failure was the channel or
//! the node behind it, this finds an intermediate node F with a channel from
//! the node before the failure and a channel to the node after it, then
//! rebuilds the route as `prefix ++ [source -> F, F -> destination] ++
//! suffix`, recomputing fees and CLTV deltas upstream.

use tracing::debug;
use waypoint_common::ln::{
    amount::Amount,
    features,
    node_id::NodeId,
};

use crate::{
    error::CommandError,
    route::{add_fee, Exclusion, HopStyle, Route, RouteHop},
    rpc::{ChannelInfo, ChannelQuery, NodeRpc},
};

/// Parameters of a `permuteroute` command.
#[derive(Clone, Debug)]
pub struct PermuteRequest {
    pub route: Route,
    /// Index of the failing hop.
    pub erring_index: usize,
    /// True if the node (rather than the channel) at the erring index
    /// failed.
    pub node_failure: bool,
    /// The payer, when repairing a route that does not start at the local
    /// node. Defaults to the local node id.
    pub source: Option<NodeId>,
    /// Channels and nodes the caller already knows to be unusable.
    pub exclude: Vec<Exclusion>,
}

/// Repair `req.route` by splicing around its failing element.
pub async fn permute_route(
    rpc: &dyn NodeRpc,
    req: &PermuteRequest,
) -> Result<Route, CommandError> {
    let route = &req.route;
    let hops = &route.hops;

    if hops.is_empty() {
        return Err(CommandError::param("cannot permute an empty route"));
    }
    if req.erring_index >= hops.len() {
        return Err(CommandError::param(format!(
            "erring_index {index} out of range for a {len}-hop route",
            index = req.erring_index,
            len = hops.len(),
        )));
    }
    if req.node_failure && req.erring_index == 0 {
        return Err(CommandError::param(
            "cannot replace the first node of a route",
        ));
    }

    let payer = match req.source {
        Some(source) => source,
        None => {
            let info = rpc
                .getinfo()
                .await
                .map_err(|err| CommandError::from_rpc(err, "getinfo"))?;
            info.id
        }
    };

    // Splice indices: keep hops[..s], replace everything up to (excluding)
    // hops[d..]. A channel failure drops the one failing hop; a node
    // failure drops the two hops around the failing node.
    let (s, d) = if req.node_failure {
        (req.erring_index - 1, req.erring_index + 1)
    } else {
        (req.erring_index, req.erring_index + 1)
    };

    let source_node = if s == 0 { payer } else { hops[s - 1].id };
    let dest_node = hops[d - 1].id;
    let source_amount = hops[s].amount_msat;
    let dest_amount = hops[d - 1].amount_msat;
    let dest_delay = hops[d - 1].delay;
    let dest_style = hops[d - 1].style;

    // Every node already on the route (plus the payer) is off-limits for
    // the intermediate: these prevent loops, not alternative paths.
    let mut exclude_nodes: Vec<NodeId> =
        hops.iter().map(|hop| hop.id).collect();
    exclude_nodes.push(payer);

    let excluded = |channel: &ChannelInfo| {
        req.exclude.iter().any(|x| {
            x.excludes_channel(channel.short_channel_id, channel.direction)
                || x.excludes_node(&channel.destination)
                || x.excludes_node(&channel.source)
        })
    };

    // Candidate first legs: channels out of the source node which can carry
    // roughly what the failing leg carried.
    let source_channels = rpc
        .listchannels(&ChannelQuery::from_source(source_node))
        .await
        .map_err(|err| CommandError::from_rpc(err, "listchannels"))?;
    let source_channels = source_channels
        .into_iter()
        .filter(|channel| {
            channel.active
                && channel.brackets(source_amount)
                && !exclude_nodes.contains(&channel.destination)
                && !excluded(channel)
        })
        .collect::<Vec<_>>();

    if source_channels.is_empty() {
        return Err(CommandError::unreachable(
            "no alternate route before erring index",
            Some("listchannels"),
        ));
    }

    // Candidate second legs: channels into the destination node which can
    // deliver the original amount. The first (source, destination) pair
    // sharing an intermediate node wins.
    let dest_channels = rpc
        .listchannels(&ChannelQuery::to_destination(dest_node))
        .await
        .map_err(|err| CommandError::from_rpc(err, "listchannels"))?;

    let mut splice = None;
    'outer: for dst_channel in dest_channels.iter() {
        if !dst_channel.active
            || !dst_channel.brackets(dest_amount)
            || excluded(dst_channel)
        {
            continue;
        }
        for src_channel in source_channels.iter() {
            if src_channel.destination == dst_channel.source {
                splice = Some((src_channel, dst_channel));
                break 'outer;
            }
        }
    }

    let Some((src_channel, dst_channel)) = splice else {
        return Err(CommandError::unreachable(
            "no alternate route around erring index",
            Some("listchannels"),
        ));
    };
    let intermediate = src_channel.destination;
    debug!(%intermediate, "Splicing detour via");

    // The intermediate may have vanished from gossip between the channel
    // and node lookups; that fails the repair, it must not crash it.
    let intermediate_info = rpc
        .listnodes(&intermediate)
        .await
        .map_err(|err| CommandError::from_rpc(err, "listnodes"))?
        .ok_or_else(|| {
            CommandError::unreachable(
                "intermediate node disappeared",
                Some("listnodes"),
            )
        })?;
    let h1_style = if intermediate_info.features.offers(features::VAR_ONION) {
        HopStyle::Tlv
    } else {
        HopStyle::Legacy
    };

    // Fees and deltas accumulate from the destination back to the source.
    let h2 = RouteHop {
        id: dest_node,
        channel: dst_channel.short_channel_id,
        direction: dst_channel.direction,
        amount_msat: dest_amount,
        delay: dest_delay,
        style: dest_style,
    };
    let h1_amount = add_fee(
        h2.amount_msat,
        dst_channel.base_fee_millisatoshi,
        dst_channel.fee_per_millionth,
    );
    let h1_delay = h2.delay + dst_channel.delay;
    let h1 = RouteHop {
        id: intermediate,
        channel: src_channel.short_channel_id,
        direction: src_channel.direction,
        amount_msat: h1_amount,
        delay: h1_delay,
        style: h1_style,
    };
    let prefix_amount = add_fee(
        h1.amount_msat,
        src_channel.base_fee_millisatoshi,
        src_channel.fee_per_millionth,
    );
    let prefix_delay = h1.delay + src_channel.delay;

    // Assemble: original prefix (topped up to supply the splice), the two
    // new hops, then the original suffix.
    let mut out_hops = Vec::with_capacity(hops.len() + 2 - (d - s));
    out_hops.extend(hops[..s].iter().cloned());

    if s > 0 {
        let supplied_amount = hops[s - 1].amount_msat;
        let supplied_delay = hops[s - 1].delay;
        // If the splice needs less than the prefix already supplies, leave
        // the prefix unchanged.
        let delta_amount = prefix_amount.saturating_sub(supplied_amount);
        let delta_delay = prefix_delay.saturating_sub(supplied_delay);

        for (j, hop) in out_hops.iter_mut().enumerate() {
            if !delta_amount.is_zero() {
                // 1 msat per remaining prefix hop covers fee-ppm rounding
                // on the increased amounts.
                let rounding = Amount::from_msat((s - j) as u64);
                hop.amount_msat = hop
                    .amount_msat
                    .saturating_add(delta_amount)
                    .saturating_add(rounding);
            }
            hop.delay += delta_delay;
        }
    }

    out_hops.push(h1);
    out_hops.push(h2);
    out_hops.extend(hops[d..].iter().cloned());

    Ok(Route::new(out_hops))
}

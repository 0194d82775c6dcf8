//! Multi-peer connect: sparked fan-out over the peer connector.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use waypoint_common::ln::{features::FeatureBits, node_id::NodeId};

use crate::{
    error::CommandError,
    rpc::NodeRpc,
    spark::{self, Spark},
};

/// Peer ids and features, parallel arrays in input order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiConnectResponse {
    pub id: Vec<NodeId>,
    pub features: Vec<FeatureBits>,
}

/// Connect to every peer in parallel. All connects are allowed to settle;
/// if any failed, the first failure (in input order) is surfaced.
pub async fn multiconnect(
    rpc: &Arc<dyn NodeRpc>,
    ids: &[NodeId],
) -> Result<MultiConnectResponse, CommandError> {
    if ids.is_empty() {
        return Err(CommandError::param("no peer ids given"));
    }

    let mut sparks = Vec::with_capacity(ids.len());
    for id in ids {
        let rpc = rpc.clone();
        let id = *id;
        sparks.push(Spark::start(format!("(connect {id})"), async move {
            rpc.connect(&id).await
        }));
    }

    let results = spark::wait_all(sparks).await;
    let mut connected_ids = Vec::with_capacity(ids.len());
    let mut features = Vec::with_capacity(ids.len());
    for result in results {
        match result {
            Ok(Ok(connected)) => {
                debug!(id = %connected.id, "Connected");
                connected_ids.push(connected.id);
                features.push(connected.features);
            }
            Ok(Err(err)) =>
                return Err(CommandError::from_rpc(err, "connect")),
            Err(cancelled) =>
                return Err(CommandError::other(cancelled.to_string())),
        }
    }

    Ok(MultiConnectResponse {
        id: connected_ids,
        features,
    })
}

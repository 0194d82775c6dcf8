//! Top level commands that can be initiated by the user.
//!
//! Thin dispatch over the engines: each method mirrors one RPC command's
//! parameter and response shape, with validation and error codes handled in
//! the engine it delegates to.

use std::sync::Arc;

use waypoint_common::ln::node_id::NodeId;

use crate::{
    accelerate::{self, TxAccelerateRequest, TxAccelerateResponse},
    connect::{self, MultiConnectResponse},
    diversity::{DiversityEngine, PaymentSession},
    error::CommandError,
    multifund::{MultiFundRequest, MultiFundResponse, MultiFunder},
    permute::{self, PermuteRequest},
    route::Route,
    rpc::NodeRpc,
    withdraw::{self, MultiWithdrawRequest, MultiWithdrawResponse},
};

pub struct Commands {
    rpc: Arc<dyn NodeRpc>,
    diversity: DiversityEngine,
    funder: MultiFunder,
}

impl Commands {
    pub fn new(rpc: Arc<dyn NodeRpc>) -> Self {
        Self {
            diversity: DiversityEngine::new(rpc.clone()),
            funder: MultiFunder::new(rpc.clone()),
            rpc,
        }
    }

    /// Open several channels with one funding transaction.
    pub async fn multifundchannel(
        &self,
        req: MultiFundRequest,
    ) -> Result<MultiFundResponse, CommandError> {
        self.funder.multifundchannel(req).await
    }

    /// Pay several on-chain outputs with one transaction.
    pub async fn multiwithdraw(
        &self,
        req: MultiWithdrawRequest,
    ) -> Result<MultiWithdrawResponse, CommandError> {
        withdraw::multiwithdraw(self.rpc.as_ref(), &req).await
    }

    /// Connect to several peers in parallel.
    pub async fn multiconnect(
        &self,
        ids: &[NodeId],
    ) -> Result<MultiConnectResponse, CommandError> {
        connect::multiconnect(&self.rpc, ids).await
    }

    /// Repair a route by splicing around its failing hop.
    pub async fn permuteroute(
        &self,
        req: PermuteRequest,
    ) -> Result<Route, CommandError> {
        permute::permute_route(self.rpc.as_ref(), &req).await
    }

    /// Bump a stuck transaction until a child of it confirms.
    pub async fn txaccelerate(
        &self,
        req: TxAccelerateRequest,
    ) -> Result<TxAccelerateResponse, CommandError> {
        accelerate::txaccelerate(self.rpc.as_ref(), &req).await
    }

    /// The next diverse route for a payment; see [`DiversityEngine`].
    pub async fn next_route(
        &self,
        session: &PaymentSession,
        destination: NodeId,
    ) -> Result<Route, CommandError> {
        self.diversity.next_route(session, destination).await
    }

    pub fn diversity(&self) -> &DiversityEngine {
        &self.diversity
    }
}

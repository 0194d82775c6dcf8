//! Multi-destination withdraw: prepare one transaction paying several
//! outputs, then broadcast it.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use waypoint_common::ln::amount_or_all::AmountOrAll;

use crate::{
    error::CommandError,
    rpc::{
        DecodedTx, Feerate, NodeRpc, OutPoint, OutputTarget, PrepareOutput,
        TxPrepareRequest, Txid,
    },
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithdrawOutput {
    pub destination: OutputTarget,
    pub amount: AmountOrAll,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiWithdrawRequest {
    pub outputs: Vec<WithdrawOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feerate: Option<Feerate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minconf: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utxos: Option<Vec<OutPoint>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiWithdrawResponse {
    pub tx: DecodedTx,
    pub txid: Txid,
}

pub async fn multiwithdraw(
    rpc: &dyn NodeRpc,
    req: &MultiWithdrawRequest,
) -> Result<MultiWithdrawResponse, CommandError> {
    if req.outputs.is_empty() {
        return Err(CommandError::param("no outputs given"));
    }
    let all_count = req
        .outputs
        .iter()
        .filter(|output| output.amount.is_all())
        .count();
    if all_count > 1 {
        return Err(CommandError::param(
            "only one output may receive \"all\"",
        ));
    }

    let outputs = req
        .outputs
        .iter()
        .map(|output| PrepareOutput {
            target: output.destination.clone(),
            amount: output.amount,
        })
        .collect();
    let prepared = rpc
        .txprepare(&TxPrepareRequest {
            outputs,
            feerate: req.feerate.clone(),
            minconf: req.minconf,
            utxos: req.utxos.clone(),
        })
        .await
        .map_err(|err| CommandError::from_rpc(err, "txprepare"))?;

    match rpc.txsend(&prepared.txid).await {
        Ok(sent) => {
            info!(txid = %sent.txid, "Withdrawal broadcast");
            Ok(MultiWithdrawResponse {
                tx: sent.tx,
                txid: sent.txid,
            })
        }
        Err(err) => {
            // Release the reservation before surfacing the failure.
            if let Err(discard_err) = rpc.txdiscard(&prepared.txid).await {
                warn!(
                    txid = %prepared.txid,
                    "txdiscard after failed send also failed: {discard_err}",
                );
            }
            Err(CommandError::from_rpc(err, "txsend"))
        }
    }
}

//! The fee acceleration loop.
//!
//! Drives the acceleration backend to bump a stuck transaction's effective
//! feerate: each round spends an `aggression` fraction of the remaining fee
//! headroom, gated on new blocks (with a bounded `waitblockheight` poll so a
//! stalled chain still re-estimates), and pushes harder every round. The
//! loop terminates when the backend no longer knows the acceleration id,
//! which means a child of the original transaction has confirmed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use waypoint_common::{backoff, ln::amount::Amount};

use crate::{
    constants,
    error::{code, CommandError},
    rpc::{FeeEstimate, NodeRpc, Txid},
};

/// Give up on a single bump after this many transient backend failures.
const MAX_TRANSIENT_RETRIES: u32 = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxAccelerateRequest {
    pub txid: Txid,
    /// The most the caller will pay, in total fees.
    pub max_acceptable_fee: Amount,
    /// Percent of the remaining fee headroom spent per bump.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggression: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxAccelerateResponse {
    pub txid: Txid,
    /// How many bumps were placed.
    pub attempts: u32,
    /// The total fee of the last placed bump.
    pub total_fee: Amount,
}

/// Accelerate `req.txid` until a child of it confirms or the fee budget is
/// exhausted.
pub async fn txaccelerate(
    rpc: &dyn NodeRpc,
    req: &TxAccelerateRequest,
) -> Result<TxAccelerateResponse, CommandError> {
    let aggression = req
        .aggression
        .unwrap_or(constants::DEFAULT_ACCELERATE_AGGRESSION);
    if aggression == 0 || aggression > 100 {
        return Err(CommandError::param(
            "aggression must be between 1 and 100 percent",
        ));
    }
    if req.max_acceptable_fee.is_zero() {
        return Err(CommandError::param("max_acceptable_fee must be nonzero"));
    }

    let started = rpc
        .txaccelerate_start(&req.txid)
        .await
        .map_err(|err| CommandError::from_rpc(err, "txaccelerate_start"))?;
    let acc_id = started.txacc_id;
    let mut estimate = started.estimate;

    if estimate.total_fee >= req.max_acceptable_fee {
        return Err(CommandError::param(format!(
            "transaction already pays {total}, at or above the acceptable \
             fee",
            total = estimate.total_fee,
        )));
    }

    let mut aggression = aggression;
    let mut attempts = 0u32;
    let mut last_fee = estimate.total_fee;

    loop {
        if estimate.total_fee >= req.max_acceptable_fee {
            return Err(CommandError::other(format!(
                "fee budget exhausted after {attempts} bumps: backend now \
                 wants more than {max}",
                max = req.max_acceptable_fee,
            )));
        }

        let target = bump_target(&estimate, req.max_acceptable_fee, aggression);
        debug!(%target, %aggression, "Placing fee bump");

        attempts += 1;
        match execute_with_retries(rpc, &acc_id, target).await {
            Outcome::Estimate(next) => {
                last_fee = target;
                estimate = next;
            }
            Outcome::Confirmed => {
                info!(txid = %req.txid, %attempts, "Acceleration child confirmed");
                return Ok(TxAccelerateResponse {
                    txid: req.txid,
                    attempts,
                    total_fee: target,
                });
            }
            Outcome::Failed(err) => return Err(err),
        }

        // Wake at the next block, or after the poll ceiling on a stalled
        // chain; either way, re-estimate and push harder.
        let info = rpc
            .getinfo()
            .await
            .map_err(|err| CommandError::from_rpc(err, "getinfo"))?;
        let reached = rpc
            .waitblockheight(
                info.blockheight + 1,
                constants::WAIT_BLOCK_HEIGHT_TIMEOUT,
            )
            .await
            .map_err(|err| CommandError::from_rpc(err, "waitblockheight"))?;
        if !reached {
            debug!("waitblockheight timed out; re-estimating anyway");
        }

        match rpc.txaccelerate_estimate(&acc_id).await {
            Ok(next) => estimate = next,
            Err(err) if err.code == code::ACCEL_ID_NOT_FOUND => {
                info!(txid = %req.txid, %attempts, "Acceleration child confirmed");
                return Ok(TxAccelerateResponse {
                    txid: req.txid,
                    attempts,
                    total_fee: last_fee,
                });
            }
            Err(err) =>
                return Err(CommandError::from_rpc(
                    err,
                    "txaccelerate_estimate",
                )),
        }

        aggression = (aggression * 2).min(100);
    }
}

/// `total + headroom * aggression%`, clamped to what the backend can place
/// and never below its minimum increment.
fn bump_target(
    estimate: &FeeEstimate,
    max_acceptable: Amount,
    aggression: u32,
) -> Amount {
    let total = estimate.total_fee.msat();
    let headroom = max_acceptable.msat().saturating_sub(total);
    let step = u128::from(headroom) * u128::from(aggression) / 100;
    let mut target = Amount::from_msat(
        total.saturating_add(u64::try_from(step).unwrap_or(u64::MAX)),
    );

    let minimum = estimate.total_fee.saturating_add(estimate.delta_fee);
    if target < minimum {
        target = minimum.min(max_acceptable);
    }
    if !estimate.max_fee.is_zero() && target > estimate.max_fee {
        target = estimate.max_fee;
    }
    target
}

enum Outcome {
    Estimate(FeeEstimate),
    Confirmed,
    Failed(CommandError),
}

/// Place one bump, locally retrying transient backend failures with
/// backoff.
async fn execute_with_retries(
    rpc: &dyn NodeRpc,
    acc_id: &crate::rpc::AccelId,
    target: Amount,
) -> Outcome {
    let mut delays = backoff::iter();
    for attempt in 0..MAX_TRANSIENT_RETRIES {
        match rpc.txaccelerate_execute(acc_id, target).await {
            Ok(estimate) => return Outcome::Estimate(estimate),
            Err(err) if err.code == code::ACCEL_ID_NOT_FOUND =>
                return Outcome::Confirmed,
            Err(err) => {
                warn!(%attempt, "txaccelerate_execute failed: {err}; retrying");
                let delay =
                    delays.next().expect("backoff iterator is infinite");
                tokio::time::sleep(delay).await;
            }
        }
    }

    match rpc.txaccelerate_execute(acc_id, target).await {
        Ok(estimate) => Outcome::Estimate(estimate),
        Err(err) if err.code == code::ACCEL_ID_NOT_FOUND =>
            Outcome::Confirmed,
        Err(err) => Outcome::Failed(CommandError::from_rpc(
            err,
            "txaccelerate_execute",
        )),
    }
}

//! The multi-destination channel funding orchestrator.
//!
//! Opens N channels with one funding transaction:
//!
//! 1. validate destinations,
//! 2. connect to every peer (sparked fan-out),
//! 3. dry-run `txprepare` paying deterministic placeholder scripts, which
//!    reserves UTXOs and resolves an "all" amount,
//! 4. `fundchannel_start` per peer (sparked),
//! 5. re-prepare with the same inputs paying the real funding scripts,
//! 6. `fundchannel_complete` per peer (sparked),
//! 7. mark every destination done, then broadcast.
//!
//! Destinations are marked done *before* broadcast because a broadcast
//! failure is ambiguous: the transaction may already be in some mempool, so
//! the channels must not be cancelled. Cleanup (reservation discard plus
//! cancellation of started-but-not-done destinations) runs on every exit
//! path, at most once, before the caller sees the reply.

use std::{collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use waypoint_common::{
    ln::{
        amount::Amount,
        amount_or_all::AmountOrAll,
        features::{self, FeatureBits},
        node_id::NodeId,
    },
    sha256,
};

use crate::{
    constants,
    error::{code, CommandError},
    rpc::{
        ChannelId, DecodedTx, Feerate, FundChannelStartRequest, NodeRpc,
        OutPoint, OutputTarget, PrepareOutput, Script, TxPrepareRequest, Txid,
    },
    spark::{self, Spark},
};

fn default_true() -> bool {
    true
}

/// One requested channel of a `multifundchannel` command.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FundDestination {
    pub id: NodeId,
    pub amount: AmountOrAll,
    #[serde(default = "default_true")]
    pub announce: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_msat: Option<Amount>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiFundRequest {
    pub destinations: Vec<FundDestination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feerate: Option<Feerate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minconf: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utxos: Option<Vec<OutPoint>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiFundResponse {
    pub tx: DecodedTx,
    pub txid: Txid,
    pub channel_ids: Vec<ChannelId>,
}

/// Per-destination protocol state. A destination never moves backwards from
/// `Done`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum DestState {
    NotStarted,
    Started,
    StartFailed,
    CompleteFailed,
    Done,
}

struct FundDest {
    params: FundDestination,
    /// Learned at connect time.
    features: FeatureBits,
    /// The unique dry-run output script for this peer.
    placeholder: Script,
    /// Resolved from the dry-run output for an "all" destination.
    amount: Amount,
    funding_script: Option<Script>,
    outnum: Option<u32>,
    channel_id: Option<ChannelId>,
    state: DestState,
}

/// One in-flight `multifundchannel`. Owns all its destinations; cleanup is
/// driven from the command's exit path.
struct FundCommand {
    dests: Vec<FundDest>,
    feerate: Option<Feerate>,
    minconf: Option<u32>,
    utxos: Option<Vec<OutPoint>>,
    /// The currently reserved prepared transaction, if any.
    txid: Option<Txid>,
    tx: Option<DecodedTx>,
    cleaned: bool,
}

/// A placeholder output script for the dry-run prepare: unique and
/// deterministic per peer so outputs can be matched back, derived by hashing
/// the peer id into a witness-v0 script shape.
fn placeholder_script(id: &NodeId) -> Script {
    let hash = sha256::digest(id.as_slice());
    let mut script = Vec::with_capacity(2 + sha256::HASH_LEN);
    script.push(0x00);
    script.push(0x20);
    script.extend_from_slice(hash.as_slice());
    Script::new(script)
}

pub struct MultiFunder {
    rpc: Arc<dyn NodeRpc>,
}

impl MultiFunder {
    pub fn new(rpc: Arc<dyn NodeRpc>) -> Self {
        Self { rpc }
    }

    /// Open a channel to every destination with a single funding
    /// transaction.
    pub async fn multifundchannel(
        &self,
        req: MultiFundRequest,
    ) -> Result<MultiFundResponse, CommandError> {
        let mut cmd = Self::validate(req)?;

        let result = self.run(&mut cmd).await;

        // Cleanup always runs on the exit path, before the reply. A param
        // error preserves the reservation so the caller can fix its request
        // and retry against the same inputs.
        let keep_reservation = matches!(&result, Err(e) if e.is_param());
        self.cleanup(&mut cmd, keep_reservation).await;

        result
    }

    // --- Phase 1: validation --- //

    fn validate(req: MultiFundRequest) -> Result<FundCommand, CommandError> {
        if req.destinations.is_empty() {
            return Err(CommandError::param("no destinations given"));
        }

        let mut seen = HashSet::new();
        let mut all_count = 0usize;
        for dest in &req.destinations {
            if !seen.insert(dest.id) {
                return Err(CommandError::param(format!(
                    "duplicate destination: {id}",
                    id = dest.id,
                )));
            }
            match dest.amount {
                AmountOrAll::All => all_count += 1,
                AmountOrAll::Amount(amount) =>
                    if amount < constants::DUST_LIMIT {
                        return Err(CommandError::protocol(
                            code::FUND_OUTPUT_IS_DUST,
                            format!(
                                "amount {amount} for {id} is below the dust \
                                 limit",
                                id = dest.id,
                            ),
                            None,
                        ));
                    },
            }
        }
        if all_count > 1 {
            return Err(CommandError::param(
                "only one destination may receive \"all\"",
            ));
        }

        let dests = req
            .destinations
            .into_iter()
            .map(|params| {
                let placeholder = placeholder_script(&params.id);
                let amount =
                    params.amount.amount().unwrap_or(Amount::ZERO);
                FundDest {
                    params,
                    features: FeatureBits::empty(),
                    placeholder,
                    amount,
                    funding_script: None,
                    outnum: None,
                    channel_id: None,
                    state: DestState::NotStarted,
                }
            })
            .collect();

        Ok(FundCommand {
            dests,
            feerate: req.feerate,
            minconf: req.minconf,
            utxos: req.utxos,
            txid: None,
            tx: None,
            cleaned: false,
        })
    }

    // --- Phases 2-7 --- //

    async fn run(
        &self,
        cmd: &mut FundCommand,
    ) -> Result<MultiFundResponse, CommandError> {
        self.connect_all(cmd).await?;

        // The funding cap can only be checked once the peers' feature bits
        // are known: large-channel peers accept any amount.
        for dest in &cmd.dests {
            if let AmountOrAll::Amount(amount) = dest.params.amount {
                if amount > constants::MAX_FUNDING
                    && !dest.features.offers(features::LARGE_CHANNELS)
                {
                    return Err(CommandError::protocol(
                        code::FUND_MAX_EXCEEDED,
                        format!(
                            "amount {amount} exceeds the maximum for peer \
                             {id}",
                            id = dest.params.id,
                        ),
                        None,
                    ));
                }
            }
        }

        self.dry_run_prepare(cmd).await?;
        self.start_all(cmd).await?;
        self.reprepare(cmd).await?;
        self.complete_all(cmd).await?;

        // Mark everything done *before* broadcasting: a failed broadcast is
        // ambiguous and must not trigger cancellation.
        for dest in cmd.dests.iter_mut() {
            dest.state = DestState::Done;
        }
        let txid = cmd.txid.take().expect("reprepare set the txid");

        match self.rpc.txsend(&txid).await {
            Ok(sent) => {
                info!(%txid, "Funding transaction broadcast");
                let channel_ids = cmd
                    .dests
                    .iter()
                    .map(|dest| {
                        dest.channel_id.expect("complete_all succeeded")
                    })
                    .collect();
                Ok(MultiFundResponse {
                    tx: sent.tx,
                    txid: sent.txid,
                    channel_ids,
                })
            }
            Err(err) => {
                warn!(%txid, "Funding broadcast failed (ambiguous): {err}");
                Err(CommandError::ambiguous_broadcast(format!(
                    "broadcast failed, transaction may still confirm: {msg}",
                    msg = err.message,
                )))
            }
        }
    }

    async fn connect_all(
        &self,
        cmd: &mut FundCommand,
    ) -> Result<(), CommandError> {
        let mut sparks = Vec::with_capacity(cmd.dests.len());
        for dest in &cmd.dests {
            let rpc = self.rpc.clone();
            let id = dest.params.id;
            sparks.push(Spark::start(format!("(connect {id})"), async move {
                rpc.connect(&id).await
            }));
        }

        // Let every connect settle; surface the first failure only after.
        let results = spark::wait_all(sparks).await;
        let mut first_err = None;
        for (dest, result) in cmd.dests.iter_mut().zip(results) {
            match result {
                Ok(Ok(connected)) => {
                    debug!(id = %dest.params.id, "Connected");
                    dest.features = connected.features;
                }
                Ok(Err(err)) =>
                    if first_err.is_none() {
                        first_err =
                            Some(CommandError::from_rpc(err, "connect"));
                    },
                Err(cancelled) =>
                    if first_err.is_none() {
                        first_err =
                            Some(CommandError::other(cancelled.to_string()));
                    },
            }
        }
        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Reserve inputs by preparing a transaction paying each destination's
    /// placeholder script, then read back the resolved amounts. This is how
    /// an "all" amount becomes concrete before any peer is involved.
    async fn dry_run_prepare(
        &self,
        cmd: &mut FundCommand,
    ) -> Result<(), CommandError> {
        let outputs = cmd
            .dests
            .iter()
            .map(|dest| PrepareOutput {
                target: OutputTarget::Script(dest.placeholder.clone()),
                amount: dest.params.amount,
            })
            .collect();

        let prepared = self
            .rpc
            .txprepare(&TxPrepareRequest {
                outputs,
                feerate: cmd.feerate.clone(),
                minconf: cmd.minconf,
                utxos: cmd.utxos.clone(),
            })
            .await
            .map_err(|err| CommandError::from_rpc(err, "txprepare"))?;
        cmd.txid = Some(prepared.txid);

        for dest in cmd.dests.iter_mut() {
            let output = prepared
                .tx
                .outputs
                .iter()
                .find(|output| output.scriptpubkey == dest.placeholder)
                .ok_or_else(|| {
                    CommandError::other(
                        "prepared transaction is missing a placeholder \
                         output",
                    )
                })?;
            dest.amount = output.amount;
            if dest.amount < constants::DUST_LIMIT {
                return Err(CommandError::protocol(
                    code::FUND_OUTPUT_IS_DUST,
                    format!(
                        "resolved amount {amount} for {id} is below the \
                         dust limit",
                        amount = dest.amount,
                        id = dest.params.id,
                    ),
                    Some("txprepare"),
                ));
            }
        }
        cmd.tx = Some(prepared.tx);
        Ok(())
    }

    async fn start_all(
        &self,
        cmd: &mut FundCommand,
    ) -> Result<(), CommandError> {
        let feerate = cmd.feerate.clone();
        let mut sparks = Vec::with_capacity(cmd.dests.len());
        for dest in &cmd.dests {
            let rpc = self.rpc.clone();
            let request = FundChannelStartRequest {
                id: dest.params.id,
                amount: dest.amount,
                feerate: feerate.clone(),
                announce: dest.params.announce,
                push_msat: dest.params.push_msat,
            };
            sparks.push(Spark::start(
                format!("(fundchannel_start {id})", id = dest.params.id),
                async move { rpc.fundchannel_start(&request).await },
            ));
        }

        // Do not abort on the first failure: let every peer answer, then
        // surface the first failure with everything in a known state.
        let results = spark::wait_all(sparks).await;
        let mut first_err = None;
        for (dest, result) in cmd.dests.iter_mut().zip(results) {
            match result {
                Ok(Ok(started)) => {
                    dest.state = DestState::Started;
                    dest.funding_script = Some(started.scriptpubkey);
                }
                Ok(Err(err)) => {
                    dest.state = DestState::StartFailed;
                    if first_err.is_none() {
                        first_err = Some(CommandError::from_rpc(
                            err,
                            "fundchannel_start",
                        ));
                    }
                }
                Err(cancelled) => {
                    dest.state = DestState::StartFailed;
                    if first_err.is_none() {
                        first_err =
                            Some(CommandError::other(cancelled.to_string()));
                    }
                }
            }
        }
        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Discard the dry-run transaction and prepare the real one: same
    /// inputs, outputs paying the actual funding scripts. Learns each
    /// destination's output index by matching scriptPubKeys.
    async fn reprepare(
        &self,
        cmd: &mut FundCommand,
    ) -> Result<(), CommandError> {
        if let Some(dry_txid) = cmd.txid {
            self.rpc
                .txdiscard(&dry_txid)
                .await
                .map_err(|err| CommandError::from_rpc(err, "txdiscard"))?;
            cmd.txid = None;
        }

        let inputs = cmd
            .tx
            .as_ref()
            .expect("dry_run_prepare set the tx")
            .inputs
            .clone();
        let outputs = cmd
            .dests
            .iter()
            .map(|dest| {
                let script = dest
                    .funding_script
                    .clone()
                    .expect("start_all succeeded");
                PrepareOutput {
                    target: OutputTarget::Script(script),
                    amount: AmountOrAll::Amount(dest.amount),
                }
            })
            .collect();

        let prepared = self
            .rpc
            .txprepare(&TxPrepareRequest {
                outputs,
                feerate: cmd.feerate.clone(),
                minconf: cmd.minconf,
                utxos: Some(inputs),
            })
            .await
            .map_err(|err| CommandError::from_rpc(err, "txprepare"))?;
        cmd.txid = Some(prepared.txid);

        for dest in cmd.dests.iter_mut() {
            let funding_script =
                dest.funding_script.as_ref().expect("start_all succeeded");
            let outnum = prepared
                .tx
                .outputs
                .iter()
                .position(|output| &output.scriptpubkey == funding_script)
                .ok_or_else(|| {
                    CommandError::other(
                        "funding transaction is missing an output",
                    )
                })?;
            dest.outnum = Some(outnum as u32);
        }
        cmd.tx = Some(prepared.tx);
        Ok(())
    }

    async fn complete_all(
        &self,
        cmd: &mut FundCommand,
    ) -> Result<(), CommandError> {
        let txid = cmd.txid.expect("reprepare set the txid");
        let mut sparks = Vec::with_capacity(cmd.dests.len());
        for dest in &cmd.dests {
            let rpc = self.rpc.clone();
            let id = dest.params.id;
            let outnum = dest.outnum.expect("reprepare set outnums");
            sparks.push(Spark::start(
                format!("(fundchannel_complete {id})"),
                async move {
                    rpc.fundchannel_complete(&id, &txid, outnum).await
                },
            ));
        }

        let results = spark::wait_all(sparks).await;
        let mut first_err = None;
        for (dest, result) in cmd.dests.iter_mut().zip(results) {
            match result {
                Ok(Ok(channel_id)) => {
                    dest.channel_id = Some(channel_id);
                }
                Ok(Err(err)) => {
                    dest.state = DestState::CompleteFailed;
                    if first_err.is_none() {
                        first_err = Some(CommandError::from_rpc(
                            err,
                            "fundchannel_complete",
                        ));
                    }
                }
                Err(cancelled) => {
                    dest.state = DestState::CompleteFailed;
                    if first_err.is_none() {
                        first_err =
                            Some(CommandError::other(cancelled.to_string()));
                    }
                }
            }
        }
        match first_err {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    // --- Cleanup --- //

    /// Discard any reserved transaction and cancel every destination that
    /// started but did not finish. Runs at most once per command; the
    /// individual operations are sparked in parallel and their failures
    /// only logged.
    async fn cleanup(&self, cmd: &mut FundCommand, keep_reservation: bool) {
        if cmd.cleaned {
            return;
        }
        cmd.cleaned = true;

        let mut sparks: Vec<Spark<()>> = Vec::new();

        match cmd.txid.take() {
            Some(txid) if keep_reservation => {
                debug!(%txid, "Preserving reservation for caller retry");
                cmd.txid = Some(txid);
            }
            Some(txid) => {
                let rpc = self.rpc.clone();
                sparks.push(Spark::start("(cleanup txdiscard)", async move {
                    if let Err(err) = rpc.txdiscard(&txid).await {
                        warn!(%txid, "Cleanup txdiscard failed: {err}");
                    }
                }));
            }
            None => (),
        }

        for dest in cmd.dests.iter_mut() {
            let started = matches!(
                dest.state,
                DestState::Started | DestState::CompleteFailed
            );
            if !started {
                continue;
            }
            let rpc = self.rpc.clone();
            let id = dest.params.id;
            sparks.push(Spark::start(
                format!("(cleanup fundchannel_cancel {id})"),
                async move {
                    if let Err(err) = rpc.fundchannel_cancel(&id).await {
                        warn!(%id, "Cleanup fundchannel_cancel failed: {err}");
                    }
                },
            ));
            dest.state = DestState::NotStarted;
        }

        let _ = spark::wait_all(sparks).await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::MockRpc;

    fn dest(n: u8, amount: AmountOrAll) -> FundDestination {
        FundDestination {
            id: NodeId::for_test(n),
            amount,
            announce: true,
            push_msat: None,
        }
    }

    fn sats(n: u32) -> AmountOrAll {
        AmountOrAll::Amount(Amount::from_sats_u32(n))
    }

    fn request(destinations: Vec<FundDestination>) -> MultiFundRequest {
        MultiFundRequest {
            destinations,
            feerate: None,
            minconf: None,
            utxos: None,
        }
    }

    #[tokio::test]
    async fn happy_path_two_destinations() {
        let rpc = Arc::new(MockRpc::new(NodeId::for_test(0)));
        rpc.set_wallet_balance(Amount::from_sats_u32(1_000_000));
        let funder = MultiFunder::new(rpc.clone());

        let response = funder
            .multifundchannel(request(vec![
                dest(1, sats(10_000)),
                dest(2, sats(20_000)),
            ]))
            .await
            .unwrap();

        assert_eq!(response.channel_ids.len(), 2);
        assert_eq!(rpc.count_calls("txsend"), 1);
        assert_eq!(rpc.count_calls("fundchannel_cancel"), 0);
        // Dry-run reservation was discarded; the broadcast one was not.
        assert_eq!(rpc.count_calls("txdiscard"), 1);
        // The broadcast transaction pays both funding scripts.
        assert_eq!(response.tx.outputs.len(), 2);
    }

    #[tokio::test]
    async fn all_resolves_to_remaining_balance() {
        let rpc = Arc::new(MockRpc::new(NodeId::for_test(0)));
        let balance = Amount::from_sats_u32(100_000_000); // 1 BTC
        rpc.set_wallet_balance(balance);
        let funder = MultiFunder::new(rpc.clone());

        let response = funder
            .multifundchannel(request(vec![
                dest(1, sats(10_000)),
                dest(2, AmountOrAll::All),
            ]))
            .await
            .unwrap();

        // The "all" output got balance - 10_000sat - fee.
        let expected = balance
            - Amount::from_sats_u32(10_000)
            - MockRpc::WALLET_FEE;
        let all_output = response
            .tx
            .outputs
            .iter()
            .find(|output| output.amount == expected);
        assert!(all_output.is_some(), "outputs: {:?}", response.tx.outputs);
    }

    /// A failing `fundchannel_complete` on one destination must cancel the
    /// other (started) destination, discard the reservation, and surface
    /// the peer's error.
    #[tokio::test]
    async fn complete_failure_cancels_and_discards() {
        let rpc = Arc::new(MockRpc::new(NodeId::for_test(0)));
        rpc.set_wallet_balance(Amount::from_sats_u32(100_000_000));
        rpc.fail_fundchannel_complete(
            NodeId::for_test(2),
            crate::error::RpcError::new(-1, "peer disconnected"),
        );
        let funder = MultiFunder::new(rpc.clone());

        let err = funder
            .multifundchannel(request(vec![
                dest(1, sats(10_000)),
                dest(2, AmountOrAll::All),
            ]))
            .await
            .unwrap_err();

        assert_eq!(err.sub_command, Some("fundchannel_complete"));
        // Both the cleanly-started P1 and the complete-failed P2 get
        // cancelled.
        assert_eq!(rpc.count_calls("fundchannel_cancel"), 2);
        // Both prepared transactions were discarded, and nothing was sent.
        assert_eq!(rpc.count_calls("txdiscard"), 2);
        assert_eq!(rpc.count_calls("txsend"), 0);
        assert!(rpc.reserved_txids().is_empty());
    }

    #[tokio::test]
    async fn start_failure_waits_for_all_then_cancels() {
        let rpc = Arc::new(MockRpc::new(NodeId::for_test(0)));
        rpc.set_wallet_balance(Amount::from_sats_u32(100_000_000));
        rpc.fail_fundchannel_start(
            NodeId::for_test(2),
            crate::error::RpcError::new(-1, "channel too small"),
        );
        let funder = MultiFunder::new(rpc.clone());

        let err = funder
            .multifundchannel(request(vec![
                dest(1, sats(10_000)),
                dest(2, sats(20_000)),
            ]))
            .await
            .unwrap_err();

        assert_eq!(err.sub_command, Some("fundchannel_start"));
        // Every start ran before the failure surfaced.
        assert_eq!(rpc.count_calls("fundchannel_start"), 2);
        // Only the destination that actually started gets cancelled.
        assert_eq!(rpc.count_calls("fundchannel_cancel"), 1);
        assert_eq!(rpc.count_calls("txsend"), 0);
    }

    #[tokio::test]
    async fn broadcast_failure_is_ambiguous() {
        let rpc = Arc::new(MockRpc::new(NodeId::for_test(0)));
        rpc.set_wallet_balance(Amount::from_sats_u32(100_000_000));
        rpc.fail_txsend(crate::error::RpcError::new(-1, "mempool rejected"));
        let funder = MultiFunder::new(rpc.clone());

        let err = funder
            .multifundchannel(request(vec![dest(1, sats(10_000))]))
            .await
            .unwrap_err();

        assert_eq!(err.code, code::FUND_BROADCAST_FAIL);
        // Destinations were done before the broadcast: no cancels, and the
        // possibly-published transaction is not discarded.
        assert_eq!(rpc.count_calls("fundchannel_cancel"), 0);
        assert_eq!(rpc.count_calls("txdiscard"), 1); // dry-run only
    }

    #[tokio::test]
    async fn validation_rejects_bad_requests() {
        let rpc = Arc::new(MockRpc::new(NodeId::for_test(0)));
        let funder = MultiFunder::new(rpc.clone());

        let err = funder
            .multifundchannel(request(Vec::new()))
            .await
            .unwrap_err();
        assert_eq!(err.code, code::PARAM);

        let err = funder
            .multifundchannel(request(vec![
                dest(1, sats(10_000)),
                dest(1, sats(20_000)),
            ]))
            .await
            .unwrap_err();
        assert_eq!(err.code, code::PARAM);

        let err = funder
            .multifundchannel(request(vec![
                dest(1, AmountOrAll::All),
                dest(2, AmountOrAll::All),
            ]))
            .await
            .unwrap_err();
        assert_eq!(err.code, code::PARAM);

        let err = funder
            .multifundchannel(request(vec![dest(1, sats(100))]))
            .await
            .unwrap_err();
        assert_eq!(err.code, code::FUND_OUTPUT_IS_DUST);

        // No RPC was ever issued for invalid parameters.
        assert_eq!(rpc.count_calls("connect"), 0);
        assert_eq!(rpc.count_calls("txprepare"), 0);
    }

    #[tokio::test]
    async fn funding_cap_applies_without_large_channel_feature() {
        let rpc = Arc::new(MockRpc::new(NodeId::for_test(0)));
        rpc.set_wallet_balance(Amount::from_msat(u64::MAX / 2));
        rpc.set_peer_features(NodeId::for_test(1), FeatureBits::empty());
        let funder = MultiFunder::new(rpc.clone());

        let err = funder
            .multifundchannel(request(vec![dest(1, sats(0x100_0000))]))
            .await
            .unwrap_err();
        assert_eq!(err.code, code::FUND_MAX_EXCEEDED);

        // A large-channel peer takes the same amount happily.
        let rpc = Arc::new(MockRpc::new(NodeId::for_test(0)));
        rpc.set_wallet_balance(Amount::from_msat(u64::MAX / 2));
        let funder = MultiFunder::new(rpc.clone());
        funder
            .multifundchannel(request(vec![dest(1, sats(0x100_0000))]))
            .await
            .unwrap();
    }

    #[test]
    fn request_params_parse_from_json() {
        let id1 = NodeId::for_test(1);
        let id2 = NodeId::for_test(2);
        let json = format!(
            r#"{{
                "destinations": [
                    {{"id": "{id1}", "amount": "10000sat"}},
                    {{"id": "{id2}", "amount": "all", "announce": false,
                      "push_msat": "1000msat"}}
                ],
                "feerate": "normal",
                "minconf": 3
            }}"#,
        );

        let req: MultiFundRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.destinations.len(), 2);
        assert_eq!(req.destinations[0].amount, sats(10_000));
        assert!(req.destinations[0].announce);
        assert_eq!(req.destinations[1].amount, AmountOrAll::All);
        assert!(!req.destinations[1].announce);
        assert_eq!(
            req.destinations[1].push_msat,
            Some(Amount::from_msat(1_000)),
        );
        assert_eq!(req.feerate, Some(crate::rpc::Feerate::Normal));
        assert_eq!(req.minconf, Some(3));
    }

    #[tokio::test]
    async fn cleanup_runs_at_most_once() {
        let rpc = Arc::new(MockRpc::new(NodeId::for_test(0)));
        let funder = MultiFunder::new(rpc.clone());

        let mut cmd =
            MultiFunder::validate(request(vec![dest(1, sats(10_000))]))
                .unwrap();
        cmd.dests[0].state = DestState::Started;

        funder.cleanup(&mut cmd, false).await;
        assert_eq!(cmd.dests[0].state, DestState::NotStarted);
        assert_eq!(rpc.count_calls("fundchannel_cancel"), 1);

        // Running cleanup again leaves the same observable state.
        cmd.dests[0].state = DestState::Started;
        funder.cleanup(&mut cmd, false).await;
        assert_eq!(rpc.count_calls("fundchannel_cancel"), 1);
    }
}

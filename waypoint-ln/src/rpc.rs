//! Interfaces to the node's other subsystems.
//!
//! The routing core drives gossip queries, the on-chain wallet, the channel
//! protocol and the acceleration backend exclusively through [`NodeRpc`].
//! Everything here mirrors those subsystems' JSON-RPC conventions; the
//! implementations (and their transports) live outside this crate.

use std::{
    fmt::{self, Display},
    str::FromStr,
    time::Duration,
};

use async_trait::async_trait;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use waypoint_common::{
    hex,
    ln::{
        amount::Amount,
        amount_or_all::AmountOrAll,
        features::FeatureBits,
        node_id::NodeId,
        scid::{Direction, ShortChannelId},
    },
};

use crate::{error::RpcError, route::{Exclusion, Route}};

// --- Identifiers --- //

/// A transaction id, as the wallet reports it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Txid([u8; 32]);

impl Txid {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

/// A channel id, as `fundchannel_complete` reports it.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ChannelId([u8; 32]);

impl ChannelId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// An opaque handle onto an acceleration attempt.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AccelId(pub String);

/// A raw output script.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

macro_rules! impl_hex_bytes_traits {
    ($name:ident) => {
        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::display(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_str(&s).map_err(de::Error::custom)
            }
        }
    };
}

impl FromStr for Txid {
    type Err = hex::DecodeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode_array::<32>(s).map(Self)
    }
}

impl FromStr for ChannelId {
    type Err = hex::DecodeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode_array::<32>(s).map(Self)
    }
}

impl FromStr for Script {
    type Err = hex::DecodeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(Self)
    }
}

impl_hex_bytes_traits!(Txid);
impl_hex_bytes_traits!(ChannelId);
impl_hex_bytes_traits!(Script);

// --- Feerates --- //

/// A feerate request, in the wallet's conventions.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Feerate {
    Slow,
    Normal,
    Urgent,
    PerKw(u32),
    PerKb(u32),
}

impl Display for Feerate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slow => f.write_str("slow"),
            Self::Normal => f.write_str("normal"),
            Self::Urgent => f.write_str("urgent"),
            Self::PerKw(n) => write!(f, "{n}perkw"),
            Self::PerKb(n) => write!(f, "{n}perkb"),
        }
    }
}

impl FromStr for Feerate {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slow" => return Ok(Self::Slow),
            "normal" => return Ok(Self::Normal),
            "urgent" => return Ok(Self::Urgent),
            _ => (),
        }
        if let Some(n) = s.strip_suffix("perkw") {
            return Ok(Self::PerKw(n.parse()?));
        }
        if let Some(n) = s.strip_suffix("perkb") {
            return Ok(Self::PerKb(n.parse()?));
        }
        anyhow::bail!("unknown feerate: {s}")
    }
}

impl Serialize for Feerate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Feerate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

// --- Request / response DTOs --- //

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetInfo {
    pub id: NodeId,
    pub blockheight: u32,
}

/// A `listchannels` filter: by source node, destination node, or both.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChannelQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<NodeId>,
}

impl ChannelQuery {
    pub fn from_source(source: NodeId) -> Self {
        Self {
            source: Some(source),
            destination: None,
        }
    }

    pub fn to_destination(destination: NodeId) -> Self {
        Self {
            source: None,
            destination: Some(destination),
        }
    }
}

/// One gossiped half-channel, in `listchannels` field conventions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub source: NodeId,
    pub destination: NodeId,
    pub short_channel_id: ShortChannelId,
    pub direction: Direction,
    pub base_fee_millisatoshi: u64,
    pub fee_per_millionth: u32,
    /// CLTV delta, blocks.
    pub delay: u32,
    pub htlc_minimum_msat: Amount,
    pub htlc_maximum_msat: Amount,
    pub active: bool,
}

impl ChannelInfo {
    /// Whether this half-channel's HTLC bounds admit `amount`.
    pub fn brackets(&self, amount: Amount) -> bool {
        self.htlc_minimum_msat <= amount && amount <= self.htlc_maximum_msat
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeInfo {
    pub nodeid: NodeId,
    pub features: FeatureBits,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetRouteRequest {
    /// Destination node.
    pub id: NodeId,
    pub amount_msat: Amount,
    pub riskfactor: u64,
    /// Final CLTV delta.
    pub cltv: u32,
    pub max_hops: u32,
    /// Route from this node instead of the local node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NodeId>,
    pub exclude: Vec<Exclusion>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectResult {
    pub id: NodeId,
    pub features: FeatureBits,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FundChannelStartRequest {
    pub id: NodeId,
    pub amount: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feerate: Option<Feerate>,
    pub announce: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_msat: Option<Amount>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FundChannelStarted {
    pub funding_address: String,
    pub scriptpubkey: Script,
}

/// A wallet UTXO reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

/// Where a prepared transaction output pays to.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    Address(String),
    Script(Script),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrepareOutput {
    pub target: OutputTarget,
    pub amount: AmountOrAll,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxPrepareRequest {
    pub outputs: Vec<PrepareOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feerate: Option<Feerate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minconf: Option<u32>,
    /// Spend exactly these inputs instead of letting the wallet pick.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utxos: Option<Vec<OutPoint>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    pub scriptpubkey: Script,
    pub amount: Amount,
}

/// A transaction, pre-decoded by the wallet. The routing core never parses
/// raw transaction bytes; it only matches outputs and re-uses inputs.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DecodedTx {
    pub inputs: Vec<OutPoint>,
    pub outputs: Vec<TxOutput>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreparedTx {
    pub txid: Txid,
    pub tx: DecodedTx,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SentTx {
    pub txid: Txid,
    pub tx: DecodedTx,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeeEstimate {
    /// Total fee paid by the transaction plus its pending children so far.
    pub total_fee: Amount,
    /// The minimum increment the backend will accept.
    pub delta_fee: Amount,
    /// The largest total fee the backend can currently place.
    pub max_fee: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccelStarted {
    pub txacc_id: AccelId,
    pub estimate: FeeEstimate,
}

// --- The collaborator trait --- //

/// The operations the routing core consumes from external collaborators:
/// gossip queries, the shortest-route finder, the peer connector, the channel
/// protocol, the on-chain wallet, and the fee-acceleration backend.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn getinfo(&self) -> Result<GetInfo, RpcError>;

    async fn listchannels(
        &self,
        query: &ChannelQuery,
    ) -> Result<Vec<ChannelInfo>, RpcError>;

    async fn listnodes(&self, id: &NodeId)
        -> Result<Option<NodeInfo>, RpcError>;

    async fn getroute(&self, req: &GetRouteRequest) -> Result<Route, RpcError>;

    async fn connect(&self, id: &NodeId) -> Result<ConnectResult, RpcError>;

    async fn fundchannel_start(
        &self,
        req: &FundChannelStartRequest,
    ) -> Result<FundChannelStarted, RpcError>;

    async fn fundchannel_complete(
        &self,
        id: &NodeId,
        txid: &Txid,
        outnum: u32,
    ) -> Result<ChannelId, RpcError>;

    async fn fundchannel_cancel(&self, id: &NodeId) -> Result<(), RpcError>;

    async fn txprepare(
        &self,
        req: &TxPrepareRequest,
    ) -> Result<PreparedTx, RpcError>;

    async fn txsend(&self, txid: &Txid) -> Result<SentTx, RpcError>;

    async fn txdiscard(&self, txid: &Txid) -> Result<(), RpcError>;

    /// Returns true once the chain reaches `height`, or false if `timeout`
    /// elapsed first.
    async fn waitblockheight(
        &self,
        height: u32,
        timeout: Duration,
    ) -> Result<bool, RpcError>;

    async fn txaccelerate_start(
        &self,
        txid: &Txid,
    ) -> Result<AccelStarted, RpcError>;

    async fn txaccelerate_estimate(
        &self,
        id: &AccelId,
    ) -> Result<FeeEstimate, RpcError>;

    async fn txaccelerate_execute(
        &self,
        id: &AccelId,
        total_fee: Amount,
    ) -> Result<FeeEstimate, RpcError>;
}

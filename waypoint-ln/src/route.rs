//! Route types.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use waypoint_common::ln::{
    amount::Amount,
    node_id::NodeId,
    scid::{Direction, ShortChannelId, ShortChannelIdDir},
};

/// The onion payload style a hop expects.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HopStyle {
    Legacy,
    Tlv,
}

/// One hop of a route: forward `amount_msat` to `id` over `channel`, with an
/// absolute CLTV of `delay` blocks.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RouteHop {
    pub id: NodeId,
    pub channel: ShortChannelId,
    pub direction: Direction,
    pub amount_msat: Amount,
    pub delay: u32,
    pub style: HopStyle,
}

/// A route: the hop sequence of a single payment path.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route {
    pub hops: Vec<RouteHop>,
}

impl Route {
    pub fn new(hops: Vec<RouteHop>) -> Self {
        Self { hops }
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// The amount delivered to the final node.
    pub fn delivered(&self) -> Amount {
        self.hops.last().map(|hop| hop.amount_msat).unwrap_or(Amount::ZERO)
    }

    /// The total fees along this route: what the payer sends minus what the
    /// final node receives.
    pub fn fee(&self) -> Amount {
        match self.hops.first() {
            Some(first) =>
                first.amount_msat.saturating_sub(self.delivered()),
            None => Amount::ZERO,
        }
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fee = self.fee();
        write!(f, "[fee {fee}: ")?;
        let num_hops = self.hops.len();
        for (i, hop) in self.hops.iter().enumerate() {
            let id = hop.id;
            let channel = hop.channel;
            write!(f, "{id}@{channel}")?;
            if i != num_hops - 1 {
                write!(f, " -> ")?;
            }
        }
        write!(f, "]")
    }
}

/// An entry of a shortest-route exclude list: a channel direction or a whole
/// node. The string forms ("BLOCKxTXxOUT/DIR", hex node id) are what the
/// external route finder takes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Exclusion {
    Channel(ShortChannelIdDir),
    Node(NodeId),
}

impl Exclusion {
    pub fn channel(scid: ShortChannelId, dir: Direction) -> Self {
        Self::Channel(ShortChannelIdDir { scid, dir })
    }

    /// Whether this entry excludes the given channel direction.
    pub fn excludes_channel(&self, scid: ShortChannelId, dir: Direction) -> bool {
        matches!(self, Self::Channel(cd) if cd.scid == scid && cd.dir == dir)
    }

    /// Whether this entry excludes the given node.
    pub fn excludes_node(&self, id: &NodeId) -> bool {
        matches!(self, Self::Node(n) if n == id)
    }
}

impl Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(scid_dir) => Display::fmt(scid_dir, f),
            Self::Node(id) => Display::fmt(id, f),
        }
    }
}

impl FromStr for Exclusion {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains('/') {
            ShortChannelIdDir::from_str(s)
                .map(Self::Channel)
                .map_err(anyhow::Error::from)
        } else {
            NodeId::from_str(s)
                .map(Self::Node)
                .map_err(anyhow::Error::from)
        }
    }
}

impl Serialize for Exclusion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Exclusion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// The amount that must enter a channel for `amount` to come out the other
/// side: `amount + base_fee + floor(amount * ppm / 10^6)`.
pub fn add_fee(amount: Amount, base_fee_msat: u64, fee_ppm: u32) -> Amount {
    let prop =
        u128::from(amount.msat()) * u128::from(fee_ppm) / 1_000_000;
    let fee = u128::from(base_fee_msat) + prop;
    amount.saturating_add(Amount::from_msat(
        u64::try_from(fee).unwrap_or(u64::MAX),
    ))
}

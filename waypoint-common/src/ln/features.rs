//! Feature bit vectors, as announced in node and channel gossip.
//!
//! Features come in even/odd pairs: the even bit means "compulsory", the odd
//! bit means "optional". A node *offers* a feature if either bit of the pair
//! is set.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::hex;

/// The variable-length (TLV) onion payload feature pair (bits 8/9).
pub const VAR_ONION: u16 = 8;

/// The large-channel ("wumbo") feature pair (bits 18/19).
pub const LARGE_CHANNELS: u16 = 18;

/// A feature bit vector. Stored big-endian as gossiped: the last byte holds
/// bits 0..=7.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct FeatureBits(Vec<u8>);

impl FeatureBits {
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Whether the given single bit is set.
    pub fn bit(&self, n: u16) -> bool {
        let n = usize::from(n);
        let byte_idx = n / 8;
        if byte_idx >= self.0.len() {
            return false;
        }
        let byte = self.0[self.0.len() - 1 - byte_idx];
        byte & (1 << (n % 8)) != 0
    }

    /// Whether the feature pair starting at even bit `n` is offered, i.e.
    /// either the compulsory or the optional bit is set.
    pub fn offers(&self, n: u16) -> bool {
        debug_assert!(n % 2 == 0, "feature pairs start at even bits");
        self.bit(n) || self.bit(n + 1)
    }

    /// Set a single bit, growing the vector as needed.
    pub fn set_bit(&mut self, n: u16) {
        let n = usize::from(n);
        let byte_idx = n / 8;
        if byte_idx >= self.0.len() {
            let grow_by = byte_idx + 1 - self.0.len();
            // Prepend zero bytes: the vector is big-endian.
            let mut grown = vec![0u8; grow_by];
            grown.extend_from_slice(&self.0);
            self.0 = grown;
        }
        let len = self.0.len();
        self.0[len - 1 - byte_idx] |= 1 << (n % 8);
    }
}

impl Display for FeatureBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::display(&self.0))
    }
}

impl FromStr for FeatureBits {
    type Err = hex::DecodeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(Self)
    }
}

impl Serialize for FeatureBits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FeatureBits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

//! Node identities.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::hex;

/// The 33-byte compressed public key which identifies a Lightning node in the
/// gossiped channel graph. The routing core never does any cryptography with
/// it; it is an opaque identity.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeId([u8; 33]);

impl NodeId {
    pub const fn new(bytes: [u8; 33]) -> Self {
        Self(bytes)
    }

    pub const fn to_array(self) -> [u8; 33] {
        self.0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::display(&self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::display(&self.0))
    }
}

impl FromStr for NodeId {
    type Err = hex::DecodeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode_array::<33>(s).map(Self)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(any(test, feature = "test-utils"))]
mod test_impl {
    use proptest::{
        arbitrary::{any, Arbitrary},
        strategy::{BoxedStrategy, Strategy},
    };

    use super::*;

    impl NodeId {
        /// A deterministic id for tests, distinguished by a single byte.
        pub fn for_test(n: u8) -> Self {
            let mut bytes = [0u8; 33];
            bytes[0] = 0x02;
            bytes[32] = n;
            Self(bytes)
        }
    }

    impl Arbitrary for NodeId {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;
        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            any::<(u8, [u8; 32])>()
                .prop_map(|(first, rest)| {
                    let mut bytes = [0u8; 33];
                    bytes[0] = first;
                    bytes[1..].copy_from_slice(&rest);
                    Self(bytes)
                })
                .boxed()
        }
    }
}

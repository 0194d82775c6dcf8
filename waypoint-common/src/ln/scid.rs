//! Short channel ids and channel directions.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A short channel id: the (block, tx index, output index) coordinates of the
/// funding output, packed into a `u64`. Displays in the node's conventional
/// "BLOCKxTXxOUT" form.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ShortChannelId(u64);

/// One of the two directions of a channel. Direction `Zero` is from the
/// lexicographically lesser node id to the greater one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Direction {
    Zero = 0,
    One = 1,
}

/// A (short channel id, direction) pair, the unit of route exclusion.
/// Displays as "BLOCKxTXxOUT/DIR".
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ShortChannelIdDir {
    pub scid: ShortChannelId,
    pub dir: Direction,
}

/// Errors that can occur when parsing a [`ShortChannelId`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid short channel id")]
pub struct ParseError;

// --- impl ShortChannelId --- //

impl ShortChannelId {
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub fn new(block: u32, txindex: u32, outnum: u16) -> Self {
        let block = u64::from(block) & 0x00ff_ffff;
        let txindex = u64::from(txindex) & 0x00ff_ffff;
        Self((block << 40) | (txindex << 16) | u64::from(outnum))
    }

    pub const fn to_u64(self) -> u64 {
        self.0
    }

    pub const fn block(&self) -> u32 {
        ((self.0 >> 40) & 0x00ff_ffff) as u32
    }

    pub const fn txindex(&self) -> u32 {
        ((self.0 >> 16) & 0x00ff_ffff) as u32
    }

    pub const fn outnum(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl Display for ShortChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let block = self.block();
        let txindex = self.txindex();
        let outnum = self.outnum();
        write!(f, "{block}x{txindex}x{outnum}")
    }
}

impl fmt::Debug for ShortChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortChannelId({self})")
    }
}

impl FromStr for ShortChannelId {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('x');
        let block = parts.next().ok_or(ParseError)?;
        let txindex = parts.next().ok_or(ParseError)?;
        let outnum = parts.next().ok_or(ParseError)?;
        if parts.next().is_some() {
            return Err(ParseError);
        }

        let block = u32::from_str(block).map_err(|_| ParseError)?;
        let txindex = u32::from_str(txindex).map_err(|_| ParseError)?;
        let outnum = u16::from_str(outnum).map_err(|_| ParseError)?;
        if block > 0x00ff_ffff || txindex > 0x00ff_ffff {
            return Err(ParseError);
        }

        Ok(Self::new(block, txindex, outnum))
    }
}

impl Serialize for ShortChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ShortChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

// --- impl Direction --- //

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Zero, Direction::One];

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn flipped(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

impl TryFrom<u8> for Direction {
    type Error = ParseError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            _ => Err(ParseError),
        }
    }
}

impl Serialize for Direction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Self::try_from(value).map_err(de::Error::custom)
    }
}

// --- impl ShortChannelIdDir --- //

impl Display for ShortChannelIdDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scid = self.scid;
        let dir = self.dir;
        write!(f, "{scid}/{dir}")
    }
}

impl FromStr for ShortChannelIdDir {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scid, dir) = s.split_once('/').ok_or(ParseError)?;
        let scid = ShortChannelId::from_str(scid)?;
        let dir = match dir {
            "0" => Direction::Zero,
            "1" => Direction::One,
            _ => return Err(ParseError),
        };
        Ok(Self { scid, dir })
    }
}

impl Serialize for ShortChannelIdDir {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ShortChannelIdDir {
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

    impl Arbitrary for ShortChannelId {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;
        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            any::<(u32, u32, u16)>()
                .prop_map(|(block, txindex, outnum)| {
                    Self::new(block & 0x00ff_ffff, txindex & 0x00ff_ffff, outnum)
                })
                .boxed()
        }
    }
}

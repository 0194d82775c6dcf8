//! A Lightning amount newtype, internally represented as a [`u64`]
//! millisatoshi count.
//!
//! Every quantity handled by the routing core (fees, HTLC bounds, channel
//! costs) is an exact number of millisatoshis, so the representation is
//! integral and all arithmetic is explicit about overflow.
//!
//! The [`Display`]/[`FromStr`]/serde forms follow the node's RPC conventions:
//! a bare integer is millisatoshis, and the `msat`/`sat` suffixes are
//! accepted on input ("10000sat"). [`Amount`] always displays as `{n}msat`.
//!
//! [`Display`]: std::fmt::Display
//! [`FromStr`]: std::str::FromStr

use std::{
    fmt::{self, Display},
    iter::Sum,
    ops::{Add, Sub},
    str::FromStr,
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Errors that can occur when attempting to construct an [`Amount`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Amount overflowed u64 millisatoshis")]
    TooLarge,
    #[error("Amount string is not a valid msat/sat value")]
    InvalidFormat,
}

/// A Lightning amount in millisatoshis.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Amount(u64);

impl Amount {
    /// An [`Amount`] of zero.
    pub const ZERO: Self = Self(0);

    /// The maximum representable [`Amount`]: [`u64::MAX`] millisatoshis.
    pub const MAX: Self = Self(u64::MAX);

    pub const MSAT_PER_SAT: u64 = 1_000;

    // --- Constructors --- //

    /// Construct an [`Amount`] from a millisatoshi [`u64`] value.
    #[inline]
    pub const fn from_msat(msat: u64) -> Self {
        Self(msat)
    }

    /// Construct an [`Amount`] from a satoshi [`u32`] value.
    #[inline]
    pub const fn from_sats_u32(sats: u32) -> Self {
        Self(sats as u64 * Self::MSAT_PER_SAT)
    }

    /// Construct an [`Amount`] from a satoshi [`u64`] value.
    #[inline]
    pub fn try_from_sats_u64(sats: u64) -> Result<Self, Error> {
        sats.checked_mul(Self::MSAT_PER_SAT)
            .map(Self)
            .ok_or(Error::TooLarge)
    }

    // --- Getters --- //

    /// Returns the [`Amount`] as a [`u64`] millisatoshi value.
    #[inline]
    pub const fn msat(&self) -> u64 {
        self.0
    }

    /// Returns the [`Amount`] as a [`u64`] satoshi value, rounding down.
    #[inline]
    pub const fn sats_floor(&self) -> u64 {
        self.0 / Self::MSAT_PER_SAT
    }

    /// Returns the [`Amount`] as a [`u64`] satoshi value, rounding up.
    #[inline]
    pub const fn sats_ceil(&self) -> u64 {
        self.0.div_ceil(Self::MSAT_PER_SAT)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    // --- Checked / saturating arithmetic --- //

    #[inline]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    #[inline]
    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

// --- Basic std::ops impls --- //
// Like the underlying `u64`, plain `+`/`-` panic on overflow; use the checked
// or saturating variants where the inputs are untrusted.

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(rhs).expect("Amount overflowed")
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        self.checked_sub(rhs).expect("Amount underflowed")
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

// --- Display / FromStr / serde --- //

impl Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}msat", self.0)
    }
}

impl FromStr for Amount {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (digits, per_sat) = if let Some(digits) = s.strip_suffix("msat") {
            (digits, false)
        } else if let Some(digits) = s.strip_suffix("sat") {
            (digits, true)
        } else {
            (s, false)
        };

        let value =
            u64::from_str(digits).map_err(|_| Error::InvalidFormat)?;

        if per_sat {
            Self::try_from_sats_u64(value)
        } else {
            Ok(Self::from_msat(value))
        }
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a msat integer or a 'msat'/'sat' suffixed string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Amount::from_msat(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Amount::from_str(v).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

// --- Tests and test infra --- //

#[cfg(any(test, feature = "test-utils"))]
mod arbitrary_impl {
    use proptest::{
        arbitrary::{any, Arbitrary},
        strategy::{BoxedStrategy, Strategy},
    };

    use super::*;

    impl Arbitrary for Amount {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;
        fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
            any::<u64>().prop_map(Amount::from_msat).boxed()
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::{prop_assert_eq, proptest};

    use super::*;

    #[test]
    fn parse_suffixes() {
        assert_eq!(Amount::from_str("123msat"), Ok(Amount::from_msat(123)));
        assert_eq!(Amount::from_str("123sat"), Ok(Amount::from_msat(123_000)));
        assert_eq!(Amount::from_str("123"), Ok(Amount::from_msat(123)));
        assert_eq!(Amount::from_str("12.3"), Err(Error::InvalidFormat));
        assert_eq!(Amount::from_str("-1msat"), Err(Error::InvalidFormat));
        assert_eq!(
            Amount::from_str(&format!("{}sat", u64::MAX)),
            Err(Error::TooLarge),
        );
    }

    #[test]
    fn display_fromstr_roundtrip() {
        proptest!(|(amount: Amount)| {
            let s = amount.to_string();
            prop_assert_eq!(Amount::from_str(&s).unwrap(), amount);
        });
    }

    #[test]
    fn serde_roundtrip_and_u64_form() {
        proptest!(|(amount: Amount)| {
            let json = serde_json::to_string(&amount).unwrap();
            prop_assert_eq!(
                serde_json::from_str::<Amount>(&json).unwrap(),
                amount,
            );

            // A bare JSON integer deserializes as msat.
            let msat_json = amount.msat().to_string();
            prop_assert_eq!(
                serde_json::from_str::<Amount>(&msat_json).unwrap(),
                amount,
            );
        });
    }

    #[test]
    fn sat_rounding() {
        let amount = Amount::from_msat(1_500);
        assert_eq!(amount.sats_floor(), 1);
        assert_eq!(amount.sats_ceil(), 2);
        assert_eq!(Amount::from_sats_u32(7).msat(), 7_000);
    }
}

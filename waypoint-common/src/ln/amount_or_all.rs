//! An enum used to request either (1) an explicit amount, or (2) the full
//! spendable balance.
//!
//! This container type provides a nice JSON-serialization and is less
//! error-prone and more explicit than `Option<Amount>`.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

#[cfg(any(test, feature = "test-utils"))]
use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};

use crate::ln::amount::Amount;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[derive(Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
pub enum AmountOrAll {
    #[serde(rename = "all")]
    All,

    #[serde(untagged)]
    Amount(Amount),
}

impl AmountOrAll {
    /// Returns the explicit amount, if there is one.
    pub fn amount(&self) -> Option<Amount> {
        match self {
            Self::All => None,
            Self::Amount(amount) => Some(*amount),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl Display for AmountOrAll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Amount(amount) => Display::fmt(amount, f),
        }
    }
}

impl FromStr for AmountOrAll {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            Ok(Self::All)
        } else {
            Amount::from_str(s)
                .map(Self::Amount)
                .map_err(anyhow::Error::from)
        }
    }
}

//! The channel cost metric.
//!
//! Both the distance-cache refresher and the pathfinders price channels with
//! the same [`Coster`], so the heuristic and the actual search cost share a
//! metric; this is what makes the differential heuristic admissible.

use waypoint_common::ln::amount::Amount;

use crate::{constants, graph::Channel};

/// Prices a half-channel for a fixed sample amount and risk preference.
///
/// `risk_factor` is a percentage per annum: it trades lockup time (the
/// channel's CLTV delta) against fees.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Coster {
    pub sample_amount: Amount,
    pub risk_factor: u64,
}

impl Coster {
    /// The cost of forwarding `sample_amount` through the given
    /// half-channel:
    ///
    /// `base_fee + ceil(amount * ppm / 10^6)
    ///  + risk_factor * (amount * cltv_delta) / (blocks_per_year * 100)`
    pub fn cost(&self, channel: &Channel) -> Amount {
        let amount = u128::from(self.sample_amount.msat());

        let base = u128::from(channel.base_fee_msat);
        let prop =
            (amount * u128::from(channel.fee_ppm)).div_ceil(1_000_000);
        let risk = u128::from(self.risk_factor)
            * (amount * u128::from(channel.cltv_delta))
            / (u128::from(constants::BLOCKS_PER_YEAR) * 100);

        let total = base.saturating_add(prop).saturating_add(risk);
        Amount::from_msat(u64::try_from(total).unwrap_or(u64::MAX))
    }
}

impl Default for Coster {
    fn default() -> Self {
        Self {
            sample_amount: constants::DEFAULT_SAMPLE_AMOUNT,
            risk_factor: constants::DEFAULT_RISK_FACTOR,
        }
    }
}

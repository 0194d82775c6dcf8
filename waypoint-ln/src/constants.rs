//! Application-level constants.

use std::time::Duration;

use waypoint_common::ln::amount::Amount;

/// Blocks per year, used to convert a per-annum risk factor into a per-block
/// cost term.
pub const BLOCKS_PER_YEAR: u64 = 52_596;

/// Default sample amount the channel coster prices: 1 mBTC.
pub const DEFAULT_SAMPLE_AMOUNT: Amount = Amount::from_msat(100_000_000);

/// Default risk factor, percent per annum.
pub const DEFAULT_RISK_FACTOR: u64 = 10;

/// Default riskfactor forwarded to the external shortest-route finder.
pub const DEFAULT_GETROUTE_RISK_FACTOR: u64 = 10;

/// Default maximum hop count requested from the shortest-route finder.
pub const DEFAULT_MAX_HOPS: u32 = 20;

/// How long a deferred distance-cache refresh waits before starting, giving
/// gossip time to catch up with a new block.
pub const DEFAULT_REFRESH_DEFER_TIME: Duration = Duration::from_secs(10);

/// How much wall-clock time a refresher wake may consume before yielding.
pub const REFRESH_WORK_BUDGET: Duration = Duration::from_millis(10);

/// How long the refresher sleeps after exhausting its working budget.
pub const REFRESH_SLEEP_TIME: Duration = Duration::from_millis(10);

/// Dijkstra iterations between budget checks.
pub const REFRESH_ITERATIONS_PER_WAKE: u32 = 16;

/// Outputs below this are uneconomical to spend.
pub const DUST_LIMIT: Amount = Amount::from_sats_u32(546);

/// The largest channel a peer without the large-channel feature accepts:
/// 2^24 - 1 satoshis.
pub const MAX_FUNDING: Amount = Amount::from_msat(0xff_ffff * 1_000);

/// Ceiling on a single `waitblockheight` poll.
pub const WAIT_BLOCK_HEIGHT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default fee-acceleration aggression, in percent of the remaining fee
/// headroom spent per bump.
pub const DEFAULT_ACCELERATE_AGGRESSION: u32 = 10;

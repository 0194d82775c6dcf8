//! Exponential backoff.

use std::{cmp::min, time::Duration};

const INITIAL_WAIT_MS: u64 = 250;
const MAXIMUM_WAIT_MS: u64 = 32_000;
const EXP_BASE: u64 = 2;

/// Get an iterator of [`Duration`]s which can be passed into e.g.
/// [`tokio::time::sleep`] to observe time-based exponential backoff.
pub fn iter() -> impl Iterator<Item = Duration> {
    (0u32..).map(|index| {
        let factor = EXP_BASE.saturating_pow(index);
        let wait_ms = INITIAL_WAIT_MS.saturating_mul(factor);
        Duration::from_millis(min(wait_ms, MAXIMUM_WAIT_MS))
    })
}

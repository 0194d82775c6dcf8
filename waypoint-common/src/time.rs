//! Time formatting helpers.

use std::{fmt, time::Duration};

/// [`fmt::Display`]s a [`Duration`] in ms with 3 decimal places, e.g.
/// "123.456ms". Used to log elapsed times in a consistent unit.
pub struct DisplayMs(pub Duration);

impl fmt::Display for DisplayMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.as_secs_f64() * 1000.0;
        write!(f, "{ms:.3}ms")
    }
}

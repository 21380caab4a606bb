//! Tick source for the regulator's periodic loops.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Shortest period a loop may run at.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// An interval whose first tick fires one full `period` from now.
/// Missed ticks are delayed, never replayed in a burst.
pub(crate) fn ticker(period: Duration) -> Interval {
    let period = period.max(MIN_PERIOD);
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

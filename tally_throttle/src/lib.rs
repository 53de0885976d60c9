//! The tally flush timing mechanism
//!
//! This library supports the delayed, coalesced flushes of the tally
//! aggregator. It holds the [`Clock`] abstraction every flush timer waits on
//! and the [`trailing::Gate`] that decides when a timer must be started.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

use async_trait::async_trait;
use tokio::time::{self, Duration, Instant};

pub mod trailing;

pub use trailing::{Arm, Gate};

#[async_trait]
/// The `Clock` used for every flush timer
///
/// One tick is one millisecond.
pub trait Clock {
    /// The number of ticks elapsed since the clock was created
    fn ticks_elapsed(&self) -> u64;
    /// Wait until `tick` ticks have elapsed since the clock was created
    async fn wait_until(&self, tick: u64);
}

#[derive(Debug, Clone, Copy)]
/// A clock that operates with respect to tokio's notion of time.
///
/// Tokio time may be paused and advanced by hand in tests, in which case this
/// clock follows along.
pub struct RealClock {
    start: Instant,
}

impl Default for RealClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

#[async_trait]
impl Clock for RealClock {
    /// Return the number of ticks since `Clock` was created, rounded up to the
    /// next whole millisecond. A deadline compared against this value is
    /// never reached before its instant.
    ///
    /// # Panics
    ///
    /// Function will panic if the number of ticks elapsed is greater than
    /// `u64::MAX`.
    #[allow(clippy::cast_possible_truncation)]
    fn ticks_elapsed(&self) -> u64 {
        let since = Instant::now().duration_since(self.start);
        let mut ticks_since: u128 = since.as_millis();
        if since.subsec_nanos() % 1_000_000 != 0 {
            ticks_since += 1;
        }
        assert!(
            ticks_since <= u128::from(u64::MAX),
            "584,554,049 years elapsed since the clock was created!"
        );
        ticks_since as u64
    }

    async fn wait_until(&self, tick: u64) {
        time::sleep_until(self.start + Duration::from_millis(tick)).await;
    }
}

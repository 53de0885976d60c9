//! Client-side aggregation of statsd-style counters.
//!
//! Application code calls [`Collector::increment`] and friends as often as it
//! likes. Calls for the same metric and tag list are summed in memory and
//! handed to the downstream [`Transport`] once per flush window, a fixed delay
//! after the first call of a quiet period. Timings, gauges, histograms and
//! sets are not aggregated and pass straight through.
//!
//! ## Metrics
//!
//! Counter totals are labelled with `direction`, either `increment` or
//! `decrement`. Transport failures are labelled with the failing `call`.
//!
//! `tally_flushes`: Drains of an accumulator table
//! `tally_emitted`: Aggregated calls made to the transport
//! `tally_keys`: Distinct keys held by an accumulator table
//! `tally_rejected`: Calls refused before accumulation
//! `tally_transport_errors`: Aggregated calls the transport failed
//!

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
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod accumulator;
pub mod collector;
pub mod config;
pub mod key;
pub mod transport;

pub use collector::Collector;
pub use config::Config;
pub use key::MetricKey;
pub use transport::Transport;

//! # pmg-watch Poller
//!
//! Poll coordinator for the PMG monitor. Each refresh cycle walks the
//! informational endpoints, every managed node, and the statistics
//! window, folding the results into one immutable snapshot. A cycle
//! either produces a complete snapshot or reports a single failure and
//! leaves the previous snapshot in place.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod poller;

pub use poller::{NodeCommand, PmgPoller, PollError, PollerConfig};

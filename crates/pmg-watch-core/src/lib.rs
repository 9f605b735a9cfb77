//! # pmg-watch Core
//!
//! Domain model for the Proxmox Mail Gateway monitor.
//!
//! This crate provides:
//! - The immutable [`Snapshot`] produced by each refresh cycle
//! - The [`NodeUpdates`] tri-state (populated / empty / unsupported)
//! - UTC day-aligned [`StatsWindow`] computation for mail statistics
//! - Counter extraction across the statistics endpoint's response shapes
//!
//! No I/O happens here; the client and poller crates drive these types.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod snapshot;
pub mod stats;
pub mod window;

pub use snapshot::{NodeUpdates, Snapshot};
pub use stats::stat_value;
pub use window::{StatsWindow, WindowError};

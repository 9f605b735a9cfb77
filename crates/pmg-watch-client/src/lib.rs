//! # pmg-watch Client
//!
//! Ticket-authenticated HTTP client for the Proxmox Mail Gateway
//! management API under `https://{host}:{port}/api2/json`.
//!
//! ## Session contract
//!
//! - Lazy login: no credential is requested until the first real call
//! - A 401 on an authenticated call triggers exactly one re-login and
//!   exactly one retry of the same request; a second 401 surfaces as an
//!   API error, never a loop
//! - Every payload is unwrapped from the API's `{data: ...}` envelope;
//!   a missing `data` field is valid-but-empty, not an error
//!
//! The [`PmgApi`] trait is the seam the poll coordinator consumes, so it
//! can be exercised against scripted in-memory implementations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod client;

pub use api::PmgApi;
pub use client::{Credential, PmgClient, PmgClientConfig, PmgError};

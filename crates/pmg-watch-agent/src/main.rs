//! # pmg-watch Agent
//!
//! Long-running monitor for a Proxmox Mail Gateway appliance.
//!
//! ## Lifecycle
//!
//! 1. Load `PMGWATCH_*` configuration and build the session client
//! 2. Run the first refresh cycle synchronously; a failure here is a
//!    startup failure, so the agent never serves an empty state
//! 3. Poll on the configured interval, keeping the last good snapshot
//!    through failed cycles, until ctrl-c

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod runtime;

pub use config::AgentConfig;
pub use runtime::Agent;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting pmg-watch agent"
    );

    let config = AgentConfig::from_env()?;
    let agent = Agent::new(config);

    agent.run().await
}

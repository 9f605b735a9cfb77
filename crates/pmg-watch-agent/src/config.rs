//! Agent configuration.

use anyhow::{Context, Result};
use pmg_watch_client::PmgClientConfig;
use pmg_watch_poller::PollerConfig;

/// Agent configuration, composed from the client and poller settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Connection parameters for the appliance.
    pub client: PmgClientConfig,
    /// Refresh cadence and statistics window.
    pub poller: PollerConfig,
}

impl AgentConfig {
    /// Load the full agent configuration from `PMGWATCH_*` environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns error when a required variable is missing, a value does
    /// not parse, or a value falls outside its valid range.
    pub fn from_env() -> Result<Self> {
        let client = PmgClientConfig::from_env().context("invalid connection settings")?;
        let poller = PollerConfig::from_env().context("invalid poller settings")?;

        Ok(Self { client, poller })
    }
}

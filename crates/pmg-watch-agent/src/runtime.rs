//! Agent runtime orchestration.

use crate::config::AgentConfig;
use anyhow::{Context, Result};
use pmg_watch_client::PmgClient;
use pmg_watch_core::{stat_value, Snapshot};
use pmg_watch_poller::PmgPoller;
use std::sync::Arc;

/// The monitoring agent: one session client, one poll coordinator, one
/// refresh loop.
pub struct Agent {
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Run the agent until ctrl-c.
    ///
    /// The first refresh runs before the agent is considered ready; an
    /// in-flight cycle at shutdown is simply dropped, leaving the last
    /// good snapshot intact.
    ///
    /// # Errors
    ///
    /// Returns error when the client cannot be built or the initial
    /// refresh fails.
    pub async fn run(self) -> Result<()> {
        let client =
            PmgClient::new(self.config.client.clone()).context("failed to create API client")?;
        let poller = PmgPoller::new(Arc::new(client), self.config.poller.clone());

        let snapshot = poller
            .refresh_now()
            .await
            .context("initial refresh failed")?;
        log_summary(&snapshot);

        tracing::info!(
            host = %self.config.client.host,
            interval_secs = self.config.poller.interval.as_secs(),
            "agent ready, polling"
        );

        tokio::select! {
            () = poller.run() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
        }

        tracing::info!("agent stopped");
        Ok(())
    }
}

/// One info line per collected snapshot.
fn log_summary(snapshot: &Snapshot) {
    let mail_total = snapshot
        .mail_stats
        .as_ref()
        .and_then(|stats| stat_value(stats, "count"));

    tracing::info!(
        version = snapshot.version_string().unwrap_or("unknown"),
        nodes = snapshot.nodes.len(),
        mail_total,
        "snapshot collected"
    );
}

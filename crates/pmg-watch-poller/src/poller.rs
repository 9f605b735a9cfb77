//! Refresh cycles, snapshot retention, and administrative commands.

use chrono::Utc;
use pmg_watch_client::{PmgApi, PmgError};
use pmg_watch_core::{NodeUpdates, Snapshot, StatsWindow};
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;

/// Statuses from the per-node updates endpoint treated as "endpoint not
/// implemented on this firmware" instead of a cycle failure. Fixed
/// allow-list; other statuses abort the cycle.
const UPDATES_SOFT_FAIL_STATUSES: [u16; 4] = [401, 403, 404, 501];

/// Configuration for the poll coordinator.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Refresh cadence, one cycle per tick.
    pub interval: Duration,
    /// Trailing UTC day count for the mail statistics window.
    pub stats_days: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            stats_days: 1,
        }
    }
}

impl PollerConfig {
    /// Load poller settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PMGWATCH_INTERVAL_SECS`: refresh cadence (default 300)
    /// - `PMGWATCH_STATS_DAYS`: statistics window (default 1)
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Config`] for unparseable or out-of-range
    /// values.
    pub fn from_env() -> Result<Self, PollError> {
        let mut config = Self::default();

        if let Ok(secs) = env::var("PMGWATCH_INTERVAL_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| PollError::Config(format!("PMGWATCH_INTERVAL_SECS: {e}")))?;
            config.interval = Duration::from_secs(secs);
        }

        if let Ok(days) = env::var("PMGWATCH_STATS_DAYS") {
            config.stats_days = days
                .parse()
                .map_err(|e| PollError::Config(format!("PMGWATCH_STATS_DAYS: {e}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configured ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Config`] when the interval is outside
    /// 10..=86400 seconds or the day count outside 1..=365.
    pub fn validate(&self) -> Result<(), PollError> {
        let secs = self.interval.as_secs();
        if !(10..=86_400).contains(&secs) {
            return Err(PollError::Config(format!(
                "refresh interval must be within 10..=86400 seconds, got {secs}"
            )));
        }
        if !(1..=365).contains(&self.stats_days) {
            return Err(PollError::Config(format!(
                "stats window must cover 1..=365 days, got {}",
                self.stats_days
            )));
        }
        Ok(())
    }
}

/// Administrative node command, dispatched outside the polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCommand {
    /// Reboot the node.
    Reboot,
    /// Shut the node down.
    Shutdown,
}

impl NodeCommand {
    /// Wire value for the command form field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reboot => "reboot",
            Self::Shutdown => "shutdown",
        }
    }
}

impl FromStr for NodeCommand {
    type Err = PollError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reboot" => Ok(Self::Reboot),
            "shutdown" => Ok(Self::Shutdown),
            other => Err(PollError::UnknownCommand(other.to_string())),
        }
    }
}

/// Poll coordinator: one refresh cycle at a time, last good snapshot
/// retained across failures.
///
/// Generic over [`PmgApi`] so cycles can run against a scripted API in
/// tests; production uses `PmgPoller<PmgClient>`.
pub struct PmgPoller<C: PmgApi> {
    api: Arc<C>,
    config: PollerConfig,
    current: RwLock<Option<Arc<Snapshot>>>,
    refresh_gate: Mutex<()>,
}

impl<C: PmgApi> PmgPoller<C> {
    /// Create a coordinator over an API client.
    pub fn new(api: Arc<C>, config: PollerConfig) -> Self {
        Self {
            api,
            config,
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    /// The most recent complete snapshot, if any cycle has succeeded.
    ///
    /// Stays readable and unchanged through any failure window.
    #[must_use]
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .expect("snapshot lock poisoned")
            .clone()
    }

    /// Run one refresh cycle now and install its snapshot.
    ///
    /// Cycles never overlap: a concurrent caller waits for the running
    /// cycle to finish. On failure the previous snapshot is retained and
    /// a single [`PollError::RefreshFailed`] is reported for the cycle.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::RefreshFailed`] wrapping the first
    /// non-exempt client failure of the cycle.
    pub async fn refresh_now(&self) -> Result<Arc<Snapshot>, PollError> {
        let _cycle = self.refresh_gate.lock().await;

        let window = StatsWindow::trailing_days(Utc::now(), self.config.stats_days)
            .map_err(|e| PollError::Config(e.to_string()))?;

        match self.collect(window).await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self.current.write().expect("snapshot lock poisoned") =
                    Some(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Err(err) => Err(PollError::RefreshFailed(err)),
        }
    }

    /// Drive the refresh cadence until the future is dropped.
    ///
    /// The owner is expected to have run the first cycle already; this
    /// loop only handles subsequent ticks, logging failed cycles and
    /// letting the next tick retry.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval fires immediately; the initial refresh already ran.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.refresh_now().await {
                Ok(snapshot) => {
                    tracing::debug!(nodes = snapshot.nodes.len(), "refresh cycle complete");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "refresh cycle failed, keeping previous snapshot");
                }
            }
        }
    }

    /// Fire an administrative command at a node, outside the cycle.
    ///
    /// # Errors
    ///
    /// Returns the client's [`PmgError`] unchanged; a command failure
    /// never touches the snapshot state.
    pub async fn execute_node_command(
        &self,
        node: &str,
        command: NodeCommand,
    ) -> Result<(), PmgError> {
        let form = vec![("command".to_string(), command.as_str().to_string())];
        self.api.post(&format!("/nodes/{node}/status"), &form).await?;
        tracing::info!(node, command = command.as_str(), "node command dispatched");
        Ok(())
    }

    /// One full cycle as a single ordered fold. The soft-fail exemption
    /// applies to the per-node updates sub-call and nothing else.
    async fn collect(&self, window: StatsWindow) -> Result<Snapshot, PmgError> {
        let version = self.api.get("/version", &[]).await?;

        let node_list = match self.api.get("/nodes", &[]).await? {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        };

        let mut nodes = BTreeMap::new();
        let mut updates = BTreeMap::new();
        for entry in &node_list {
            let Some(name) = node_name(entry) else {
                tracing::debug!(?entry, "skipping node entry without a name");
                continue;
            };

            let status = self.api.get(&format!("/nodes/{name}/status"), &[]).await?;
            nodes.insert(
                name.to_string(),
                status.unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            );

            let pending = match self
                .api
                .get(&format!("/nodes/{name}/apt/update"), &[])
                .await
            {
                Ok(Some(Value::Array(list))) => NodeUpdates::Available(list),
                Ok(Some(other)) => NodeUpdates::Available(vec![other]),
                Ok(None) => NodeUpdates::Available(Vec::new()),
                Err(err) if updates_unsupported(&err) => {
                    tracing::debug!(node = name, error = %err, "updates endpoint unsupported");
                    NodeUpdates::Unsupported
                }
                Err(err) => return Err(err),
            };
            updates.insert(name.to_string(), pending);
        }

        let stats_query = vec![
            ("starttime".to_string(), window.start.to_string()),
            ("endtime".to_string(), window.end.to_string()),
        ];
        let mail_stats = self.api.get("/statistics/mail", &stats_query).await?;

        let spam_status = self.api.get("/quarantine/spamstatus", &[]).await?;
        let virus_status = self.api.get("/quarantine/virusstatus", &[]).await?;

        Ok(Snapshot {
            version,
            nodes,
            updates,
            mail_stats,
            spam_status,
            virus_status,
        })
    }
}

/// Node name from a `/nodes` list entry, `node` field before `name`.
fn node_name(entry: &Value) -> Option<&str> {
    entry
        .get("node")
        .and_then(Value::as_str)
        .or_else(|| entry.get("name").and_then(Value::as_str))
}

/// Whether an updates-endpoint failure means "older firmware without
/// this endpoint" rather than a real fault.
fn updates_unsupported(err: &PmgError) -> bool {
    match err {
        PmgError::ApiRequest {
            status: Some(status),
            ..
        } if UPDATES_SOFT_FAIL_STATUSES.contains(status) => true,
        PmgError::ApiRequest { message, .. } => {
            message.to_ascii_lowercase().contains("not implemented")
        }
        _ => false,
    }
}

/// Errors reported by the poll coordinator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PollError {
    /// Poller configuration is invalid.
    #[error("config error: {0}")]
    Config(String),
    /// A refresh cycle failed; the previous snapshot remains current.
    #[error("refresh failed: {0}")]
    RefreshFailed(#[source] PmgError),
    /// An administrative command string was not recognized.
    #[error("unknown node command: {0}")]
    UnknownCommand(String),
}

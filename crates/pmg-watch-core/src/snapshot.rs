//! The aggregate result of one refresh cycle.
//!
//! A [`Snapshot`] is assembled once per cycle and wholly replaces its
//! predecessor. There is no incremental merge: a failed cycle leaves the
//! previous snapshot in place, untouched.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Pending-updates state for a single managed node.
///
/// The distinction between an empty update list and an unsupported
/// endpoint is structural: `Available(vec![])` means the node answered
/// "no updates pending", while `Unsupported` means the node's firmware
/// does not expose the updates endpoint at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeUpdates {
    /// The node reported its update list (possibly empty).
    Available(Vec<Value>),
    /// The updates endpoint is not implemented on this node.
    ///
    /// Serializes as `null`, matching the wire-level absence the
    /// appliance's older firmware produces.
    Unsupported,
}

impl NodeUpdates {
    /// Whether the endpoint was unsupported on this node.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported)
    }

    /// Number of pending updates, or `None` when the endpoint is
    /// unsupported.
    #[must_use]
    pub fn pending_count(&self) -> Option<usize> {
        match self {
            Self::Available(list) => Some(list.len()),
            Self::Unsupported => None,
        }
    }
}

/// One complete, immutable result of a polling cycle.
///
/// Field payloads are kept as raw [`Value`] mappings: the appliance owns
/// the schema, and collaborators read whichever keys they present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Server version envelope from `/version`.
    pub version: Option<Value>,
    /// Node name to status object from `/nodes/{name}/status`. A node
    /// that answered with an empty body maps to an empty object.
    pub nodes: BTreeMap<String, Value>,
    /// Node name to pending-updates state.
    pub updates: BTreeMap<String, NodeUpdates>,
    /// Mail statistics for the trailing stats window.
    pub mail_stats: Option<Value>,
    /// Spam quarantine status.
    pub spam_status: Option<Value>,
    /// Virus quarantine status.
    pub virus_status: Option<Value>,
}

impl Snapshot {
    /// Names of the nodes seen in this cycle, in sorted order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Status object for a node, if it was present this cycle.
    #[must_use]
    pub fn node_status(&self, name: &str) -> Option<&Value> {
        self.nodes.get(name)
    }

    /// Pending-updates state for a node, if it was present this cycle.
    #[must_use]
    pub fn node_updates(&self, name: &str) -> Option<&NodeUpdates> {
        self.updates.get(name)
    }

    /// Human-readable server version, preferring `version` over
    /// `release` in the version envelope.
    #[must_use]
    pub fn version_string(&self) -> Option<&str> {
        let version = self.version.as_ref()?;
        version
            .get("version")
            .and_then(Value::as_str)
            .or_else(|| version.get("release").and_then(Value::as_str))
    }
}

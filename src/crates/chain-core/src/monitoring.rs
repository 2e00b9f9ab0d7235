//! Per-chain monitoring fan-in
//!
//! The monitoring agent keeps a workflow summary per chain (latest signal
//! seen for every node, local and remote) and re-publishes every report on a
//! broadcast channel for in-process observers.

use crate::reporting::ReportMessage;
use crate::types::ChainSignal;
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the observer channel
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Latest observed state of one node within a chain
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTrack {
    pub index: usize,
    pub count: usize,
    pub last_signal: ChainSignal,
}

/// Process-wide monitoring agent tracking progress across all nodes
#[derive(Debug)]
pub struct MonitoringAgent {
    /// chain id → node id → latest track
    workflows: DashMap<String, HashMap<String, NodeTrack>>,
    /// chain id → remote monitoring host
    remote_hosts: DashMap<String, String>,
    events: broadcast::Sender<ReportMessage>,
}

impl MonitoringAgent {
    /// Create a fresh agent
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            workflows: DashMap::new(),
            remote_hosts: DashMap::new(),
            events,
        }
    }

    /// Record a report message and re-publish it to observers
    pub fn handle_report(&self, message: &ReportMessage) {
        debug!(
            chain_id = %message.chain_id,
            node_id = %message.node_id,
            signal = %message.signal,
            "monitoring report"
        );
        self.workflows
            .entry(message.chain_id.clone())
            .or_default()
            .insert(
                message.node_id.clone(),
                NodeTrack {
                    index: message.index,
                    count: message.count,
                    last_signal: message.signal,
                },
            );
        // No receivers is fine; observers are optional.
        let _ = self.events.send(message.clone());
    }

    /// Subscribe to the stream of report messages
    pub fn subscribe(&self) -> broadcast::Receiver<ReportMessage> {
        self.events.subscribe()
    }

    /// Register the remote monitoring host of a chain
    pub fn set_remote_host(&self, chain_id: impl Into<String>, host: impl Into<String>) {
        self.remote_hosts.insert(chain_id.into(), host.into());
    }

    /// Remote monitoring host of a chain, if any
    pub fn remote_host(&self, chain_id: &str) -> Option<String> {
        self.remote_hosts.get(chain_id).map(|h| h.clone())
    }

    /// Snapshot of a chain's workflow summary
    pub fn chain_summary(&self, chain_id: &str) -> Option<HashMap<String, NodeTrack>> {
        self.workflows.get(chain_id).map(|w| w.clone())
    }

    /// Drop all state held for a chain
    pub fn remove_chain(&self, chain_id: &str) {
        self.workflows.remove(chain_id);
        self.remote_hosts.remove(chain_id);
    }
}

impl Default for MonitoringAgent {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-node reporting agent
//!
//! Every node owns a reporting agent that emits progress and status
//! messages on two channels: the in-process local-signal bus (the
//! monitoring agent) and, when the chain is monitored from another host,
//! the global-signal bus (the reporting sink callback).

use crate::broadcast::ReportingSink;
use crate::monitoring::MonitoringAgent;
use crate::types::ChainSignal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Host value meaning "deliver in-process only"
pub const LOCAL_MONITORING_HOST: &str = "local";

/// One message on the reporting buses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMessage {
    pub chain_id: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub count: usize,
    pub signal: ChainSignal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Reporting agent owned by one node
#[derive(Clone)]
pub struct ReportingAgent {
    chain_id: String,
    node_id: String,
    index: usize,
    count: usize,
    monitoring: Arc<MonitoringAgent>,
    sink: Option<Arc<dyn ReportingSink>>,
    monitoring_host: Option<String>,
}

impl ReportingAgent {
    /// Create an agent for a node at `index` of `count` within a chain
    pub fn new(
        chain_id: impl Into<String>,
        node_id: impl Into<String>,
        index: usize,
        count: usize,
        monitoring: Arc<MonitoringAgent>,
        sink: Option<Arc<dyn ReportingSink>>,
        monitoring_host: Option<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            node_id: node_id.into(),
            index,
            count,
            monitoring,
            sink,
            monitoring_host,
        }
    }

    /// Chain this agent reports for
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Emit a signal on the local bus and, when remote-monitored, the global bus
    pub async fn report(&self, signal: ChainSignal, payload: Option<Value>) {
        let message = ReportMessage {
            chain_id: self.chain_id.clone(),
            node_id: self.node_id.clone(),
            index: self.index,
            count: self.count,
            signal,
            payload,
        };

        self.monitoring.handle_report(&message);

        let host = match self.monitoring_host.as_deref() {
            Some(host) if host != LOCAL_MONITORING_HOST && !host.is_empty() => host,
            _ => return,
        };
        match &self.sink {
            Some(sink) => {
                if let Err(e) = sink.report(host, message).await {
                    warn!(%host, error = %e, "failed to forward report to monitoring host");
                }
            }
            None => warn!(%host, "no reporting sink registered, dropping global signal"),
        }
    }
}

impl std::fmt::Debug for ReportingAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportingAgent")
            .field("chain_id", &self.chain_id)
            .field("node_id", &self.node_id)
            .field("index", &self.index)
            .field("count", &self.count)
            .finish()
    }
}

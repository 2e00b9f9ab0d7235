//! Outbound interfaces of the supervisor
//!
//! The core never talks to the network; it calls these traits. The default
//! implementations in the connector crate map them onto HTTP POST on
//! conventional paths, but any transport can be plugged in.

use crate::reporting::ReportMessage;
use crate::types::{NodeConfig, NodeSignal, PipelineMeta};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

/// Setup message delivered to the supervisor hosting a remote stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    pub chain_id: String,
    pub remote_configs: NodeConfig,
}

/// Pre-stage sub-chain dispatched before a node's own pipelines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    pub chain_config: Vec<NodeConfig>,
    pub data: Value,
}

/// Data forwarded to the next hop of a chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePayload {
    pub chain_id: String,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PipelineMeta>,
    pub data: Value,
}

/// Target of a remotely requested suspend/resume
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTarget {
    pub target_id: String,
    /// `"local"` when the node lives on the receiving host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_uri: Option<String>,
}

/// Suspend/resume request travelling between supervisors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub chain_id: String,
    pub signal: NodeSignal,
    pub payload: StatusTarget,
}

/// Distribute a remote stage config to its hosting supervisor
#[async_trait]
pub trait BroadcastSetup: Send + Sync {
    async fn broadcast_setup(&self, message: SetupMessage) -> Result<()>;
}

/// Run a pre-stage sub-chain and return its result data
#[async_trait]
pub trait BroadcastPre: Send + Sync {
    async fn broadcast_pre(&self, message: PreMessage) -> Result<Value>;
}

/// Forward data to the next hop of a chain on another host
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn remote_service(&self, payload: ServicePayload) -> Result<()>;
}

/// Enqueue a suspend/resume on a node hosted elsewhere
#[async_trait]
pub trait NodeStatusBroadcast: Send + Sync {
    async fn node_status(&self, message: StatusMessage) -> Result<()>;
}

/// Deliver a report message to a chain's monitoring host
#[async_trait]
pub trait ReportingSink: Send + Sync {
    async fn report(&self, host: &str, message: ReportMessage) -> Result<()>;
}

/// Resolve the base URL of the host serving a target
///
/// `meta.resolver` wins when set; otherwise the scheme+host+port of the
/// target id parsed as a URL. Returns `None` (caller drops the message with
/// a warning) when no host can be determined.
pub fn resolve_host(target_id: &str, meta: Option<&PipelineMeta>) -> Option<String> {
    if let Some(resolver) = meta.and_then(|m| m.resolver.as_deref()) {
        return Some(resolver.trim_end_matches('/').to_string());
    }

    let url = match Url::parse(target_id) {
        Ok(url) => url,
        Err(_) => {
            warn!(%target_id, "cannot resolve host for target");
            return None;
        }
    };
    let host = url.host_str()?;
    let mut base = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        base.push_str(&format!(":{}", port));
    }
    Some(base)
}

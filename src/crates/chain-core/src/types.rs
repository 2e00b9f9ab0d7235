//! Configuration and wire model for chains, nodes, and signals
//!
//! All structs serialize with camelCase field names and all signal/status
//! enums serialize with their wire spellings, so JSON bodies exchanged with
//! peer supervisors match the chain-config schema exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a node config is meant to run, relative to the deploying host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// Hosted by the deploying supervisor
    #[default]
    Local,
    /// Hosted by a peer supervisor, reached through broadcast
    Remote,
}

/// How a child chain relates to its parent node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildMode {
    /// Run to completion before the parent continues
    Normal,
    /// Fire-and-forget with start/completion notifications on the parent
    Parallel,
    /// Pre-stage sub-chain executed before the parent's own pipelines
    Pre,
}

/// Bitmask controlling node retention after hand-off
///
/// Only the two low bits are defined; the rest are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainType(pub u32);

impl ChainType {
    /// Node is removed by the supervisor right after hand-off
    pub const AUTO_DELETE: ChainType = ChainType(1);
    /// Node survives chain completion
    pub const PERSISTENT: ChainType = ChainType(1 << 1);

    /// Whether all bits of `other` are set
    pub fn contains(self, other: ChainType) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the node should be kept after hand-off
    pub fn is_persistent(self) -> bool {
        self.contains(Self::PERSISTENT)
    }

    /// Whether the node should be deleted right after hand-off
    pub fn is_auto_delete(self) -> bool {
        self.contains(Self::AUTO_DELETE)
    }
}

impl Default for ChainType {
    fn default() -> Self {
        Self::AUTO_DELETE
    }
}

impl std::ops::BitOr for ChainType {
    type Output = ChainType;

    fn bitor(self, rhs: ChainType) -> ChainType {
        ChainType(self.0 | rhs.0)
    }
}

/// Node execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Created but not yet executed
    #[serde(rename = "NODE_PENDING")]
    Pending,
    /// Currently digesting data through its pipelines
    #[serde(rename = "NODE_IN_PROGRESS")]
    InProgress,
    /// Paused between batches, awaiting resume
    #[serde(rename = "NODE_SUSPENDED")]
    Suspended,
    /// All pipelines emitted output and the node handed off
    #[serde(rename = "NODE_COMPLETED")]
    Completed,
    /// A processor failed
    #[serde(rename = "NODE_FAILED")]
    Failed,
    /// Removed from the supervisor registry
    #[serde(rename = "NODE_DELETED")]
    Deleted,
}

impl NodeStatus {
    /// Whether the status admits no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Deleted)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "NODE_PENDING",
            Self::InProgress => "NODE_IN_PROGRESS",
            Self::Suspended => "NODE_SUSPENDED",
            Self::Completed => "NODE_COMPLETED",
            Self::Failed => "NODE_FAILED",
            Self::Deleted => "NODE_DELETED",
        };
        write!(f, "{}", s)
    }
}

/// Control signal delivered to a node's status queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeSignal {
    /// Pause at the next inter-batch checkpoint
    #[serde(rename = "NODE_SUSPEND")]
    Suspend,
    /// Clear a suspension and continue
    #[serde(rename = "NODE_RESUME")]
    Resume,
    /// Plain status passthrough applied via the node's status setter
    #[serde(untagged)]
    Status(NodeStatus),
}

impl std::fmt::Display for NodeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Suspend => write!(f, "NODE_SUSPEND"),
            Self::Resume => write!(f, "NODE_RESUME"),
            Self::Status(s) => write!(f, "{}", s),
        }
    }
}

/// Signal carried on the reporting buses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainSignal {
    #[serde(rename = "NODE_SETUP_COMPLETED")]
    NodeSetupCompleted,
    #[serde(rename = "NODE_IN_PROGRESS")]
    NodeInProgress,
    #[serde(rename = "NODE_SUSPENDED")]
    NodeSuspended,
    #[serde(rename = "NODE_COMPLETED")]
    NodeCompleted,
    #[serde(rename = "NODE_FAILED")]
    NodeFailed,
    /// Emitted by the last node of a chain instead of a hand-off
    #[serde(rename = "NODE_END_OF_PIPELINE")]
    NodeEndOfPipeline,
    /// Deletion deferred to the monitoring host's discretion
    #[serde(rename = "NODE_PENDING_DELETION")]
    NodePendingDeletion,
    #[serde(rename = "CHAIN_DEPLOYED")]
    ChainDeployed,
    /// A status notification was relayed towards another host
    #[serde(rename = "CHAIN_NOTIFIED")]
    ChainNotified,
    #[serde(rename = "CHILD_CHAIN_STARTED")]
    ChildChainStarted,
    #[serde(rename = "CHILD_CHAIN_COMPLETED")]
    ChildChainCompleted,
}

impl std::fmt::Display for ChainSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NodeSetupCompleted => "NODE_SETUP_COMPLETED",
            Self::NodeInProgress => "NODE_IN_PROGRESS",
            Self::NodeSuspended => "NODE_SUSPENDED",
            Self::NodeCompleted => "NODE_COMPLETED",
            Self::NodeFailed => "NODE_FAILED",
            Self::NodeEndOfPipeline => "NODE_END_OF_PIPELINE",
            Self::NodePendingDeletion => "NODE_PENDING_DELETION",
            Self::ChainDeployed => "CHAIN_DEPLOYED",
            Self::ChainNotified => "CHAIN_NOTIFIED",
            Self::ChildChainStarted => "CHILD_CHAIN_STARTED",
            Self::ChildChainCompleted => "CHILD_CHAIN_COMPLETED",
        };
        write!(f, "{}", s)
    }
}

impl From<NodeStatus> for ChainSignal {
    fn from(status: NodeStatus) -> Self {
        match status {
            NodeStatus::Pending | NodeStatus::InProgress => Self::NodeInProgress,
            NodeStatus::Suspended => Self::NodeSuspended,
            NodeStatus::Completed => Self::NodeCompleted,
            NodeStatus::Failed => Self::NodeFailed,
            NodeStatus::Deleted => Self::NodePendingDeletion,
        }
    }
}

/// Metadata attached to a service reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMeta {
    /// Base URL of the host serving this target, overriding URL parsing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<String>,
    /// Opaque configuration carried through to the process callback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
}

/// One outbound service reference inside a node config
///
/// Accepts either a bare target id string or a `{targetId, meta}` object on
/// the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ServiceEntry")]
pub struct ServiceConfig {
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PipelineMeta>,
}

impl ServiceConfig {
    /// Create a service reference without metadata
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            meta: None,
        }
    }

    /// Attach pipeline metadata
    pub fn with_meta(mut self, meta: PipelineMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServiceEntry {
    Id(String),
    Full {
        #[serde(rename = "targetId")]
        target_id: String,
        #[serde(default)]
        meta: Option<PipelineMeta>,
    },
}

impl From<ServiceEntry> for ServiceConfig {
    fn from(entry: ServiceEntry) -> Self {
        match entry {
            ServiceEntry::Id(target_id) => Self {
                target_id,
                meta: None,
            },
            ServiceEntry::Full { target_id, meta } => Self { target_id, meta },
        }
    }
}

/// Configuration of one chain stage
///
/// Built by the caller; `chain_id`, `index`, `count`, and `monitoring_host`
/// are filled in at chain creation, the `next_*` fields at distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default)]
    pub location: Location,
    pub services: Vec<ServiceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_host: Option<String>,
    #[serde(default)]
    pub chain_type: ChainType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_mode: Option<ChildMode>,
    /// Pre-stage sub-chains; only the first non-empty list is executed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre: Vec<Vec<NodeConfig>>,
    /// Child chain deployed by this node before its own pipelines run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_config: Option<Vec<NodeConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_config: Option<Box<NodeConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_node_resolver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_meta: Option<PipelineMeta>,
    /// Signals enqueued on the node as soon as it is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_queue: Option<Vec<NodeSignal>>,
    /// Reserved metadata, never consulted by scheduling
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl NodeConfig {
    /// Create a local config from service references
    pub fn new(services: Vec<ServiceConfig>) -> Self {
        Self {
            chain_id: None,
            index: None,
            count: None,
            location: Location::Local,
            services,
            monitoring_host: None,
            chain_type: ChainType::default(),
            child_mode: None,
            pre: Vec::new(),
            chain_config: None,
            root_config: None,
            next_target_id: None,
            next_node_resolver: None,
            next_meta: None,
            signal_queue: None,
            dependencies: Vec::new(),
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Set the chain type bitmask
    pub fn with_chain_type(mut self, chain_type: ChainType) -> Self {
        self.chain_type = chain_type;
        self
    }

    /// First service reference, if any
    pub fn first_service(&self) -> Option<&ServiceConfig> {
        self.services.first()
    }
}

/// Ordered list of stage configs making up one chain
pub type ChainConfig = Vec<NodeConfig>;

/// Local view of a chain held by a supervisor
#[derive(Debug, Clone)]
pub struct ChainRelation {
    pub config: ChainConfig,
    /// Id of the local root node, if this host runs the chain's head
    pub root_node_id: Option<String>,
    /// Deferred initial data for pending chains
    pub data_ref: Option<Value>,
    pub parent_chain_id: Option<String>,
}

impl ChainRelation {
    /// Create a relation around a config
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            root_node_id: None,
            data_ref: None,
            parent_chain_id: None,
        }
    }
}

/// Where a node hands its output off to
#[derive(Debug, Clone, PartialEq)]
pub enum NextNodeInfo {
    /// In-process call into the local supervisor
    Local { node_id: String },
    /// Forward through the remote-service callback
    Remote {
        target_id: String,
        meta: Option<PipelineMeta>,
        resolver: Option<String>,
    },
}

/// Payload handed to a process callback for one service invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PipelineMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_node_resolver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_target_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_service_config_from_string() {
        let services: Vec<ServiceConfig> = serde_json::from_value(json!(["svc-A"])).unwrap();
        assert_eq!(services[0].target_id, "svc-A");
        assert!(services[0].meta.is_none());
    }

    #[test]
    fn test_service_config_from_object() {
        let services: Vec<ServiceConfig> = serde_json::from_value(json!([
            {"targetId": "http://h:9/svc", "meta": {"resolver": "http://h:9/"}}
        ]))
        .unwrap();
        assert_eq!(services[0].target_id, "http://h:9/svc");
        assert_eq!(
            services[0].meta.as_ref().unwrap().resolver.as_deref(),
            Some("http://h:9/")
        );
    }

    #[test]
    fn test_node_config_defaults() {
        let config: NodeConfig =
            serde_json::from_value(json!({"services": ["svc-A"], "location": "local"})).unwrap();
        assert_eq!(config.location, Location::Local);
        assert!(config.chain_type.is_auto_delete());
        assert!(!config.chain_type.is_persistent());
        assert!(config.pre.is_empty());
        assert!(config.dependencies.is_empty());
    }

    #[test]
    fn test_chain_type_bits() {
        let both = ChainType::AUTO_DELETE | ChainType::PERSISTENT;
        assert!(both.is_persistent());
        assert!(both.is_auto_delete());
        assert!(!ChainType(0).is_auto_delete());
        assert!(ChainType(0b100).contains(ChainType(0b100)));
    }

    #[test]
    fn test_node_status_wire_names() {
        assert_eq!(
            serde_json::to_value(NodeStatus::InProgress).unwrap(),
            json!("NODE_IN_PROGRESS")
        );
        assert_eq!(NodeStatus::Completed.to_string(), "NODE_COMPLETED");
        assert!(NodeStatus::Failed.is_terminal());
        assert!(!NodeStatus::Suspended.is_terminal());
    }

    #[test]
    fn test_node_signal_wire_names() {
        let signals: Vec<NodeSignal> =
            serde_json::from_value(json!(["NODE_SUSPEND", "NODE_RESUME", "NODE_FAILED"])).unwrap();
        assert_eq!(signals[0], NodeSignal::Suspend);
        assert_eq!(signals[1], NodeSignal::Resume);
        assert_eq!(signals[2], NodeSignal::Status(NodeStatus::Failed));
    }

    #[test]
    fn test_chain_signal_display() {
        assert_eq!(
            ChainSignal::NodeEndOfPipeline.to_string(),
            "NODE_END_OF_PIPELINE"
        );
        assert_eq!(ChainSignal::ChainDeployed.to_string(), "CHAIN_DEPLOYED");
    }

    #[test]
    fn test_config_roundtrip() {
        let config = NodeConfig::new(vec![
            ServiceConfig::new("svc-A").with_meta(PipelineMeta {
                resolver: Some("http://h:9/".to_string()),
                configuration: None,
            }),
        ])
        .with_location(Location::Remote)
        .with_chain_type(ChainType::PERSISTENT);

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["location"], json!("remote"));
        let back: NodeConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}

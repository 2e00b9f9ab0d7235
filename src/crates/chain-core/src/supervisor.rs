//! Per-host supervisor
//!
//! The supervisor is the single authority over its host: only it mutates
//! the node registry, only it creates chain ids, and only it issues runs
//! into a node's execution queue. It also splits a chain config into local
//! node setups plus a remote broadcast, and relays inbound suspend/resume
//! notifications to the right host.

use crate::broadcast::{
    BroadcastPre, BroadcastSetup, NodeStatusBroadcast, RemoteService, ReportingSink, SetupMessage,
    StatusMessage, StatusTarget,
};
use crate::monitoring::MonitoringAgent;
use crate::node::Node;
use crate::processor::ProcessCallback;
use crate::reporting::{ReportMessage, ReportingAgent, LOCAL_MONITORING_HOST};
use crate::status::ResumePayload;
use crate::types::{
    CallbackPayload, ChainConfig, ChainRelation, ChainSignal, ChildMode, Location, NextNodeInfo,
    NodeConfig, NodeSignal, NodeStatus, ServiceConfig,
};
use crate::{ChainError, Result};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

static GLOBAL_SUPERVISOR: OnceLock<Arc<NodeSupervisor>> = OnceLock::new();

/// Outbound callbacks held by a supervisor
///
/// Every slot is optional; a missing callback downgrades the corresponding
/// operation to a logged no-op.
#[derive(Clone, Default)]
pub struct SupervisorCallbacks {
    pub process: Option<Arc<dyn ProcessCallback>>,
    pub pre_process: Option<Arc<dyn ProcessCallback>>,
    pub broadcast_setup: Option<Arc<dyn BroadcastSetup>>,
    pub broadcast_pre: Option<Arc<dyn BroadcastPre>>,
    pub remote_service: Option<Arc<dyn RemoteService>>,
    pub node_status: Option<Arc<dyn NodeStatusBroadcast>>,
    pub reporting: Option<Arc<dyn ReportingSink>>,
}

impl SupervisorCallbacks {
    /// Create an empty callback set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the process callback
    pub fn with_process(mut self, callback: Arc<dyn ProcessCallback>) -> Self {
        self.process = Some(callback);
        self
    }

    /// Set the pre-process callback
    pub fn with_pre_process(mut self, callback: Arc<dyn ProcessCallback>) -> Self {
        self.pre_process = Some(callback);
        self
    }

    /// Set the broadcast-setup callback
    pub fn with_broadcast_setup(mut self, callback: Arc<dyn BroadcastSetup>) -> Self {
        self.broadcast_setup = Some(callback);
        self
    }

    /// Set the broadcast-pre callback
    pub fn with_broadcast_pre(mut self, callback: Arc<dyn BroadcastPre>) -> Self {
        self.broadcast_pre = Some(callback);
        self
    }

    /// Set the remote-service callback
    pub fn with_remote_service(mut self, callback: Arc<dyn RemoteService>) -> Self {
        self.remote_service = Some(callback);
        self
    }

    /// Set the node-status broadcast callback
    pub fn with_node_status(mut self, callback: Arc<dyn NodeStatusBroadcast>) -> Self {
        self.node_status = Some(callback);
        self
    }

    /// Set the reporting sink
    pub fn with_reporting(mut self, callback: Arc<dyn ReportingSink>) -> Self {
        self.reporting = Some(callback);
        self
    }
}

/// Request accepted by [`NodeSupervisor::handle_request`], tagged by signal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "signal")]
pub enum SupervisorRequest {
    #[serde(rename = "CHAIN_DEPLOY", rename_all = "camelCase")]
    ChainDeploy {
        config: ChainConfig,
        #[serde(default)]
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_chain_id: Option<String>,
    },
    #[serde(rename = "CHAIN_PREPARE", rename_all = "camelCase")]
    ChainPrepare { chain_id: String },
    #[serde(rename = "CHAIN_START", rename_all = "camelCase")]
    ChainStart {
        chain_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename = "CHAIN_START_PENDING_OCCURRENCE", rename_all = "camelCase")]
    ChainStartPendingOccurrence { chain_id: String },
    #[serde(rename = "NODE_SETUP", rename_all = "camelCase")]
    NodeSetup {
        chain_id: String,
        config: Box<NodeConfig>,
    },
    #[serde(rename = "NODE_CREATE", rename_all = "camelCase")]
    NodeCreate { config: Box<NodeConfig> },
    #[serde(rename = "NODE_DELETE", rename_all = "camelCase")]
    NodeDelete { node_id: String },
    #[serde(rename = "NODE_RUN", rename_all = "camelCase")]
    NodeRun {
        node_id: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename = "NODE_SEND_DATA", rename_all = "camelCase")]
    NodeSendData {
        chain_id: String,
        target_id: String,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename = "NODE_PRE", rename_all = "camelCase")]
    NodePre {
        config: Box<NodeConfig>,
        #[serde(default)]
        data: Value,
    },
    #[serde(rename = "NODE_SUSPEND", rename_all = "camelCase")]
    NodeSuspend {
        chain_id: String,
        target_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host_uri: Option<String>,
    },
    #[serde(rename = "NODE_RESUME", rename_all = "camelCase")]
    NodeResume {
        chain_id: String,
        target_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host_uri: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
}

/// Result of a dispatched request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SupervisorResponse {
    /// Response carrying nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Response carrying a chain id
    pub fn chain(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: Some(chain_id.into()),
            ..Self::default()
        }
    }

    /// Response carrying a node id
    pub fn node(node_id: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            ..Self::default()
        }
    }

    /// Response carrying a data value
    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }
}

/// Per-host orchestrator owning local nodes and chains
pub struct NodeSupervisor {
    me: Weak<NodeSupervisor>,
    uid: String,
    callbacks: SupervisorCallbacks,
    monitoring: Arc<MonitoringAgent>,
    nodes: DashMap<String, Arc<Node>>,
    chains: DashMap<String, ChainRelation>,
    child_chains: DashMap<String, Vec<String>>,
}

impl NodeSupervisor {
    /// Create a supervisor handle
    ///
    /// Use this directly in tests; use [`NodeSupervisor::init`] to also
    /// register the process-wide handle.
    pub fn new(uid: impl Into<String>, callbacks: SupervisorCallbacks) -> Arc<Self> {
        let uid = uid.into();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            uid,
            callbacks,
            monitoring: Arc::new(MonitoringAgent::new()),
            nodes: DashMap::new(),
            chains: DashMap::new(),
            child_chains: DashMap::new(),
        })
    }

    /// Create and register the process-wide supervisor
    pub fn init(uid: impl Into<String>, callbacks: SupervisorCallbacks) -> Result<Arc<Self>> {
        let supervisor = Self::new(uid, callbacks);
        GLOBAL_SUPERVISOR
            .set(supervisor.clone())
            .map_err(|_| ChainError::StateViolation("supervisor already initialized".to_string()))?;
        info!(tag = %supervisor.tag(), "supervisor initialized");
        Ok(supervisor)
    }

    /// Process-wide supervisor handle, if initialized
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL_SUPERVISOR.get().cloned()
    }

    /// Owned handle to this supervisor, for detached work
    fn handle(&self) -> Arc<Self> {
        self.me.upgrade().expect("supervisor is always held in an Arc")
    }

    /// Supervisor uid
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Log tag of this supervisor
    pub fn tag(&self) -> String {
        format!("@supervisor:{}", self.uid)
    }

    /// Outbound callbacks
    pub fn callbacks(&self) -> &SupervisorCallbacks {
        &self.callbacks
    }

    /// Monitoring agent of this host
    pub fn monitoring(&self) -> Arc<MonitoringAgent> {
        self.monitoring.clone()
    }

    /// Look up a node by id
    pub fn node(&self, node_id: &str) -> Option<Arc<Node>> {
        self.nodes.get(node_id).map(|n| n.clone())
    }

    /// Number of registered nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Local view of a chain
    pub fn chain(&self, chain_id: &str) -> Option<ChainRelation> {
        self.chains.get(chain_id).map(|r| r.clone())
    }

    /// Child chain ids registered under a parent
    pub fn child_chains(&self, parent_chain_id: &str) -> Vec<String> {
        self.child_chains
            .get(parent_chain_id)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Nodes answering for `(target_id, chain_id)`
    pub fn find_nodes_by_target(&self, chain_id: &str, target_id: &str) -> Vec<Arc<Node>> {
        self.nodes
            .iter()
            .filter(|entry| entry.value().matches_target(chain_id, target_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Dispatch a tagged request
    pub async fn handle_request(
        &self,
        request: SupervisorRequest,
    ) -> Result<SupervisorResponse> {
        debug!(tag = %self.tag(), request = ?request, "dispatching request");
        match request {
            SupervisorRequest::ChainDeploy {
                config,
                data,
                parent_chain_id,
            } => {
                let chain_id = self.deploy_chain(config, data, parent_chain_id).await?;
                // Acceptance is what the caller waits for; the run itself
                // is observable through the monitoring stream.
                let supervisor = self.handle();
                let started = chain_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = supervisor.start_chain(&started, None).await {
                        error!(chain_id = %started, error = %e, "chain start failed");
                    }
                });
                Ok(SupervisorResponse::chain(chain_id))
            }
            SupervisorRequest::ChainPrepare { chain_id } => {
                self.prepare_chain_distribution(&chain_id).await?;
                Ok(SupervisorResponse::chain(chain_id))
            }
            SupervisorRequest::ChainStart { chain_id, data } => {
                self.start_chain(&chain_id, data).await?;
                Ok(SupervisorResponse::chain(chain_id))
            }
            SupervisorRequest::ChainStartPendingOccurrence { chain_id } => {
                self.start_pending_chain(&chain_id).await?;
                Ok(SupervisorResponse::chain(chain_id))
            }
            SupervisorRequest::NodeSetup { chain_id, config } => {
                let node_id = self.setup_node(&chain_id, *config).await?;
                Ok(SupervisorResponse::node(node_id))
            }
            SupervisorRequest::NodeCreate { config } => {
                let node_id = self.create_node(*config).await?;
                Ok(SupervisorResponse::node(node_id))
            }
            SupervisorRequest::NodeDelete { node_id } => {
                self.delete_node(&node_id)?;
                Ok(SupervisorResponse::empty())
            }
            SupervisorRequest::NodeRun { node_id, data } => {
                self.run_node(&node_id, data).await?;
                Ok(SupervisorResponse::node(node_id))
            }
            SupervisorRequest::NodeSendData {
                chain_id,
                target_id,
                data,
            } => {
                self.run_node_by_target(&chain_id, &target_id, data).await?;
                Ok(SupervisorResponse::empty())
            }
            SupervisorRequest::NodePre { config, data } => {
                let data = self.run_pre_callback(&config, data).await?;
                Ok(SupervisorResponse::with_data(data))
            }
            SupervisorRequest::NodeSuspend {
                chain_id,
                target_id,
                host_uri,
            } => {
                self.enqueue_node_status(
                    StatusMessage {
                        chain_id,
                        signal: NodeSignal::Suspend,
                        payload: StatusTarget {
                            target_id,
                            host_uri,
                        },
                    },
                    None,
                )
                .await?;
                Ok(SupervisorResponse::empty())
            }
            SupervisorRequest::NodeResume {
                chain_id,
                target_id,
                host_uri,
                data,
                params,
            } => {
                self.enqueue_node_status(
                    StatusMessage {
                        chain_id,
                        signal: NodeSignal::Resume,
                        payload: StatusTarget {
                            target_id,
                            host_uri,
                        },
                    },
                    Some(ResumePayload { data, params }),
                )
                .await?;
                Ok(SupervisorResponse::empty())
            }
        }
    }

    /// Assign a chain id and fill index/count/monitoring-host across a config
    pub fn create_chain(&self, mut config: ChainConfig) -> Result<String> {
        if config.is_empty() {
            return Err(ChainError::ConfigInvalid("empty chain config".to_string()));
        }
        if config.iter().any(|c| c.services.is_empty()) {
            return Err(ChainError::ConfigInvalid(
                "node config without services".to_string(),
            ));
        }

        let chain_id = config[0]
            .chain_id
            .clone()
            .unwrap_or_else(|| self.generate_chain_id());
        if self.chains.contains_key(&chain_id) {
            return Err(ChainError::StateViolation(format!(
                "chain {} already deployed",
                chain_id
            )));
        }

        let count = config.len();
        let monitoring_host = config.iter().find_map(|c| c.monitoring_host.clone());
        for (index, node_config) in config.iter_mut().enumerate() {
            node_config.chain_id = Some(chain_id.clone());
            node_config.index = Some(index);
            node_config.count = Some(count);
            if node_config.monitoring_host.is_none() {
                node_config.monitoring_host = monitoring_host.clone();
            }
        }
        if let Some(host) = monitoring_host.filter(|h| h != LOCAL_MONITORING_HOST) {
            self.monitoring.set_remote_host(chain_id.clone(), host);
        }

        self.chains
            .insert(chain_id.clone(), ChainRelation::new(config));
        info!(tag = %self.tag(), chain_id = %chain_id, count, "chain created");
        Ok(chain_id)
    }

    /// Split a chain into local linked nodes plus a remote broadcast
    pub async fn prepare_chain_distribution(&self, chain_id: &str) -> Result<()> {
        let config = self
            .chains
            .get(chain_id)
            .map(|r| r.config.clone())
            .ok_or_else(|| ChainError::RoutingMiss(format!("chain {}", chain_id)))?;

        // Local stages become nodes, in config order.
        let mut local_nodes: Vec<(usize, String)> = Vec::new();
        for (index, node_config) in config.iter().enumerate() {
            if node_config.location == Location::Local {
                let node_id = self.create_node(node_config.clone()).await?;
                local_nodes.push((index, node_id));
            }
        }

        // Link each local node to its successor.
        for (position, (index, node_id)) in local_nodes.iter().enumerate() {
            let next_info = match config.get(index + 1) {
                None => None,
                Some(next) if next.location == Location::Local => local_nodes
                    .get(position + 1)
                    .map(|(_, id)| NextNodeInfo::Local { node_id: id.clone() }),
                Some(next) => next.first_service().map(Self::remote_hop),
            };
            if let (Some(info), Some(node)) = (next_info, self.node(node_id)) {
                node.set_next_node_info(info);
            }
        }

        if let Some((_, root_id)) = local_nodes.first() {
            if let Some(mut relation) = self.chains.get_mut(chain_id) {
                relation.root_node_id = Some(root_id.clone());
            }
        }

        // Remote stages are annotated with their own successor by lookahead
        // and delivered to their hosting supervisors, best-effort.
        for (index, node_config) in config.iter().enumerate() {
            if node_config.location != Location::Remote {
                continue;
            }
            let mut remote_config = node_config.clone();
            if let Some(service) = config.get(index + 1).and_then(|next| next.first_service()) {
                remote_config.next_target_id = Some(service.target_id.clone());
                remote_config.next_meta = service.meta.clone();
                remote_config.next_node_resolver =
                    service.meta.as_ref().and_then(|m| m.resolver.clone());
            }
            let message = SetupMessage {
                chain_id: chain_id.to_string(),
                remote_configs: remote_config,
            };
            match &self.callbacks.broadcast_setup {
                Some(callback) => {
                    if let Err(e) = callback.broadcast_setup(message).await {
                        warn!(chain_id, error = %e, "remote setup broadcast failed");
                    }
                }
                None => warn!(chain_id, "no broadcast-setup callback registered"),
            }
        }
        Ok(())
    }

    /// Create, distribute, and stash the initial data of a chain
    pub async fn deploy_chain(
        &self,
        config: ChainConfig,
        data: Value,
        parent_chain_id: Option<String>,
    ) -> Result<String> {
        let chain_id = self.create_chain(config)?;
        self.prepare_chain_distribution(&chain_id).await?;

        if let Some(mut relation) = self.chains.get_mut(&chain_id) {
            relation.data_ref = Some(data);
            relation.parent_chain_id = parent_chain_id.clone();
        }
        if let Some(parent) = parent_chain_id {
            self.child_chains
                .entry(parent)
                .or_default()
                .push(chain_id.clone());
        }

        if let Some(root) = self.root_node(&chain_id) {
            root.report(ChainSignal::ChainDeployed, None).await;
        }
        info!(tag = %self.tag(), chain_id = %chain_id, "chain deployed");
        Ok(chain_id)
    }

    /// Run the local root node of a chain
    pub async fn start_chain(&self, chain_id: &str, data: Option<Value>) -> Result<()> {
        let relation = self
            .chain(chain_id)
            .ok_or_else(|| ChainError::RoutingMiss(format!("chain {}", chain_id)))?;
        let root_id = relation.root_node_id.ok_or_else(|| {
            ChainError::RoutingMiss(format!("chain {} has no local root node", chain_id))
        })?;
        let data = data.or(relation.data_ref).unwrap_or(Value::Null);
        self.run_node(&root_id, data).await
    }

    /// Start a deployed-but-pending chain with its stashed data
    ///
    /// A parallel child runs detached, notifying the parent root node when
    /// it starts and when it finishes; a serial child runs to completion
    /// and propagates its failure to the caller.
    pub async fn start_pending_chain(&self, chain_id: &str) -> Result<()> {
        let relation = self
            .chain(chain_id)
            .ok_or_else(|| ChainError::RoutingMiss(format!("chain {}", chain_id)))?;
        let data = relation.data_ref.clone();
        let parallel = relation
            .config
            .first()
            .and_then(|c| c.child_mode)
            == Some(ChildMode::Parallel);
        let parent_root = relation
            .parent_chain_id
            .as_deref()
            .and_then(|parent| self.root_node(parent));

        if parallel {
            if let Some(root) = &parent_root {
                root.report(
                    ChainSignal::ChildChainStarted,
                    Some(serde_json::json!({ "chainId": chain_id })),
                )
                .await;
            }
            let supervisor = self.handle();
            let child_id = chain_id.to_string();
            tokio::spawn(async move {
                if let Err(e) = supervisor.start_chain(&child_id, data).await {
                    warn!(chain_id = %child_id, error = %e, "parallel child chain failed");
                }
                if let Some(root) = parent_root {
                    root.report(
                        ChainSignal::ChildChainCompleted,
                        Some(serde_json::json!({ "chainId": child_id })),
                    )
                    .await;
                }
            });
            Ok(())
        } else {
            let result = self.start_chain(chain_id, data).await;
            if result.is_ok() {
                if let Some(root) = &parent_root {
                    root.report(
                        ChainSignal::ChildChainCompleted,
                        Some(serde_json::json!({ "chainId": chain_id })),
                    )
                    .await;
                }
            }
            result
        }
    }

    /// Register a remote-delivered stage config as a local node
    pub async fn setup_node(&self, chain_id: &str, mut config: NodeConfig) -> Result<String> {
        config.chain_id = Some(chain_id.to_string());
        let node_id = self.create_node(config.clone()).await?;

        let mut relation = self
            .chains
            .entry(chain_id.to_string())
            .or_insert_with(|| ChainRelation::new(vec![config.clone()]));
        if relation.root_node_id.is_none() {
            relation.root_node_id = Some(node_id.clone());
        }
        drop(relation);

        if let Some(host) = config.monitoring_host.filter(|h| h != LOCAL_MONITORING_HOST) {
            self.monitoring.set_remote_host(chain_id.to_string(), host);
        }
        Ok(node_id)
    }

    /// Create a node from a config and register it
    pub async fn create_node(&self, mut config: NodeConfig) -> Result<String> {
        if config.services.is_empty() {
            return Err(ChainError::ConfigInvalid(
                "node config without services".to_string(),
            ));
        }
        config.location = Location::Local;

        let node_id = Uuid::new_v4().to_string();
        let reporting = match (config.chain_id.clone(), config.index, config.count) {
            (Some(chain_id), Some(index), Some(count)) => Some(ReportingAgent::new(
                chain_id,
                node_id.clone(),
                index,
                count,
                self.monitoring.clone(),
                self.callbacks.reporting.clone(),
                config.monitoring_host.clone(),
            )),
            _ => None,
        };

        let next_info = config.next_target_id.clone().map(|target_id| {
            NextNodeInfo::Remote {
                target_id,
                meta: config.next_meta.clone(),
                resolver: config.next_node_resolver.clone(),
            }
        });

        let node = Node::with_id(node_id.clone(), config, self.callbacks.process.clone(), reporting);
        if let Some(info) = next_info {
            node.set_next_node_info(info);
        }
        self.nodes.insert(node_id.clone(), node.clone());
        info!(tag = %self.tag(), node_id = %node_id, "node created");
        node.report(ChainSignal::NodeSetupCompleted, None).await;
        Ok(node_id)
    }

    /// Remove a node from the registry
    ///
    /// Deleting a persistent node is a no-op.
    pub fn delete_node(&self, node_id: &str) -> Result<()> {
        let Some(node) = self.node(node_id) else {
            warn!(tag = %self.tag(), node_id, "no node registered for delete request");
            return Ok(());
        };
        if node.config().chain_type.is_persistent() {
            debug!(node_id, "persistent node, delete is a no-op");
            return Ok(());
        }
        self.nodes.remove(node_id);
        node.set_status(NodeStatus::Deleted);
        info!(tag = %self.tag(), node_id, "node deleted");
        Ok(())
    }

    /// Issue a run into a node's execution queue
    ///
    /// An unknown node id is logged and swallowed so the rest of the chain
    /// can still make progress.
    pub fn run_node(&self, node_id: &str, data: Value) -> BoxFuture<'static, Result<()>> {
        let supervisor = self.handle();
        let node_id = node_id.to_string();
        Box::pin(async move {
            let Some(node) = supervisor.node(&node_id) else {
                warn!(tag = %supervisor.tag(), node_id = %node_id, "no node registered for run request");
                return Ok(());
            };
            node.execute(&supervisor, data).await
        })
    }

    /// Run the nodes answering for `(target_id, chain_id)` with the data
    pub async fn run_node_by_target(
        &self,
        chain_id: &str,
        target_id: &str,
        data: Value,
    ) -> Result<()> {
        let nodes = self.find_nodes_by_target(chain_id, target_id);
        if nodes.is_empty() {
            warn!(tag = %self.tag(), chain_id, target_id, "no node for target");
            return Err(ChainError::RoutingMiss(format!(
                "{} in chain {}",
                target_id, chain_id
            )));
        }
        for node in nodes {
            node.execute(self, data.clone()).await?;
        }
        Ok(())
    }

    /// Run the pre-process callback for a pre-stage config
    pub async fn run_pre_callback(&self, config: &NodeConfig, data: Value) -> Result<Value> {
        let Some(callback) = &self.callbacks.pre_process else {
            warn!(tag = %self.tag(), "no pre-process callback registered, returning empty value");
            return Ok(Value::Null);
        };
        let service = config.first_service().ok_or_else(|| {
            ChainError::ConfigInvalid("pre-stage config without services".to_string())
        })?;
        callback
            .digest(CallbackPayload {
                target_id: service.target_id.clone(),
                meta: service.meta.clone(),
                chain_id: config.chain_id.clone(),
                data,
                next_target_id: config.next_target_id.clone(),
                next_node_resolver: config.next_node_resolver.clone(),
                previous_target_id: None,
            })
            .await
    }

    /// Apply or relay an inbound suspend/resume notification
    ///
    /// Targets whose `host_uri` is local are resolved by `(target_id,
    /// chain_id)` and enqueued; others are dispatched through the
    /// node-status broadcast and reported as `CHAIN_NOTIFIED`.
    pub async fn enqueue_node_status(
        &self,
        message: StatusMessage,
        resume_payload: Option<ResumePayload>,
    ) -> Result<()> {
        let host_uri = message.payload.host_uri.as_deref().unwrap_or(LOCAL_MONITORING_HOST);
        if host_uri != LOCAL_MONITORING_HOST && !host_uri.is_empty() {
            match &self.callbacks.node_status {
                Some(callback) => {
                    if let Err(e) = callback.node_status(message.clone()).await {
                        warn!(host_uri, error = %e, "node status broadcast failed");
                    }
                }
                None => warn!(host_uri, "no node-status callback registered"),
            }
            if let Some(root) = self.root_node(&message.chain_id) {
                root.report(ChainSignal::ChainNotified, None).await;
            }
            return Ok(());
        }

        let nodes = self.find_nodes_by_target(&message.chain_id, &message.payload.target_id);
        if nodes.is_empty() {
            warn!(
                tag = %self.tag(),
                chain_id = %message.chain_id,
                target_id = %message.payload.target_id,
                "no node for status signal"
            );
            return Err(ChainError::RoutingMiss(format!(
                "{} in chain {}",
                message.payload.target_id, message.chain_id
            )));
        }

        for node in nodes {
            node.enqueue_signals(vec![message.signal], resume_payload.clone());
            // An idle suspended node has nothing draining its queue, so the
            // supervisor processes it and restarts the execution.
            if message.signal == NodeSignal::Resume && node.status() == NodeStatus::Suspended {
                node.process_signals();
                if node.resume_armed() {
                    let supervisor = self.handle();
                    let node = node.clone();
                    tokio::spawn(async move {
                        if let Err(e) = node.execute(&supervisor, Value::Null).await {
                            error!(node_id = %node.id(), error = %e, "resumed execution failed");
                        }
                    });
                }
            }
        }
        Ok(())
    }

    /// Deliver an inbound report message to the monitoring agent
    pub fn notify(&self, message: &ReportMessage) {
        self.monitoring.handle_report(message);
    }

    /// Local root node of a chain, if any
    pub fn root_node(&self, chain_id: &str) -> Option<Arc<Node>> {
        let root_id = self.chains.get(chain_id)?.root_node_id.clone()?;
        self.node(&root_id)
    }

    fn remote_hop(service: &ServiceConfig) -> NextNodeInfo {
        NextNodeInfo::Remote {
            target_id: service.target_id.clone(),
            meta: service.meta.clone(),
            resolver: service.meta.as_ref().and_then(|m| m.resolver.clone()),
        }
    }

    fn generate_chain_id(&self) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}",
            self.uid,
            Utc::now().timestamp_millis(),
            &suffix[..8]
        )
    }
}

impl std::fmt::Debug for NodeSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSupervisor")
            .field("uid", &self.uid)
            .field("nodes", &self.nodes.len())
            .field("chains", &self.chains.len())
            .finish()
    }
}

//! Node execution engine
//!
//! A node runs its pipelines in batches of three, joined before the next
//! batch starts, and drains its signal queue at every inter-batch
//! checkpoint. That checkpoint is the only place a suspension can take
//! effect, which keeps the saved cursor exact. Hand-off to the next stage
//! happens in-process for local neighbors and through the remote-service
//! callback otherwise.

use crate::broadcast::{PreMessage, ServicePayload};
use crate::pipeline::{Pipeline, PipelineContext};
use crate::processor::{ProcessCallback, Processor};
use crate::reporting::ReportingAgent;
use crate::status::{NodeStatusManager, ResumePayload, ResumeState, SuspendedState};
use crate::supervisor::NodeSupervisor;
use crate::types::{
    ChainSignal, NextNodeInfo, NodeConfig, NodeSignal, NodeStatus,
};
use crate::Result;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pipelines scheduled concurrently per batch
pub const BATCH_SIZE: usize = 3;

#[derive(Debug)]
struct NodeState {
    status: NodeStatus,
    progress: f64,
    output: Vec<Value>,
}

/// A runtime instance executing one stage of a chain
pub struct Node {
    id: String,
    config: NodeConfig,
    pipelines: Vec<Pipeline>,
    state: Mutex<NodeState>,
    status_manager: Mutex<NodeStatusManager>,
    next_node_info: RwLock<Option<NextNodeInfo>>,
    reporting: Option<ReportingAgent>,
    /// Serial execution queue: concurrent `execute` calls chain in lock order
    exec_lock: tokio::sync::Mutex<()>,
}

impl Node {
    /// Create a node with a generated id
    pub fn new(
        config: NodeConfig,
        process_callback: Option<Arc<dyn ProcessCallback>>,
        reporting: Option<ReportingAgent>,
    ) -> Arc<Self> {
        Self::with_id(
            Uuid::new_v4().to_string(),
            config,
            process_callback,
            reporting,
        )
    }

    /// Create a node with a caller-chosen id
    pub fn with_id(
        id: String,
        config: NodeConfig,
        process_callback: Option<Arc<dyn ProcessCallback>>,
        reporting: Option<ReportingAgent>,
    ) -> Arc<Self> {
        let pipelines = config
            .services
            .iter()
            .map(|service| Pipeline::new(vec![Processor::new(service, process_callback.clone())]))
            .collect();

        let mut status_manager = NodeStatusManager::new();
        if let Some(signals) = config.signal_queue.clone() {
            status_manager.enqueue_signals(signals, None);
        }

        Arc::new(Self {
            id,
            config,
            pipelines,
            state: Mutex::new(NodeState {
                status: NodeStatus::Pending,
                progress: 0.0,
                output: Vec::new(),
            }),
            status_manager: Mutex::new(status_manager),
            next_node_info: RwLock::new(None),
            reporting,
            exec_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Node id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Node configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Current status
    pub fn status(&self) -> NodeStatus {
        self.state.lock().status
    }

    /// Current progress in `[0, 1]`
    pub fn progress(&self) -> f64 {
        self.state.lock().progress
    }

    /// Snapshot of the collected pipeline outputs
    pub fn output(&self) -> Vec<Value> {
        self.state.lock().output.clone()
    }

    /// Number of pipelines this node runs
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Set the node's status without reporting
    pub fn set_status(&self, status: NodeStatus) {
        self.state.lock().status = status;
    }

    /// Where this node hands off to
    pub fn next_node_info(&self) -> Option<NextNodeInfo> {
        self.next_node_info.read().clone()
    }

    /// Link this node to its successor
    pub fn set_next_node_info(&self, info: NextNodeInfo) {
        *self.next_node_info.write() = Some(info);
    }

    /// Whether this node answers for `(target_id, chain_id)`
    pub fn matches_target(&self, chain_id: &str, target_id: &str) -> bool {
        self.config.chain_id.as_deref() == Some(chain_id)
            && self
                .config
                .services
                .iter()
                .any(|service| service.target_id == target_id)
    }

    /// Append control signals to the node's queue
    pub fn enqueue_signals(&self, signals: Vec<NodeSignal>, resume_payload: Option<ResumePayload>) {
        self.status_manager
            .lock()
            .enqueue_signals(signals, resume_payload);
    }

    /// Drain the signal queue outside of an execution
    ///
    /// Used by the supervisor to arm a resume on an idle suspended node.
    pub fn process_signals(&self) -> Vec<NodeSignal> {
        let signals = self.status_manager.lock().process();
        self.apply_status_signals(&signals);
        signals
    }

    /// Whether a processed resume is waiting for the next execution
    pub fn resume_armed(&self) -> bool {
        self.status_manager.lock().resume_armed()
    }

    /// Emit a signal through the node's reporting agent, if it has one
    pub async fn report(&self, signal: ChainSignal, payload: Option<Value>) {
        if let Some(agent) = &self.reporting {
            agent.report(signal, payload).await;
        }
    }

    /// Digest a data value through this node's pipelines
    ///
    /// Executions are strictly serialized per node; a second call queues
    /// until the first finishes or suspends.
    pub async fn execute(&self, supervisor: &NodeSupervisor, data: Value) -> Result<()> {
        let _guard = self.exec_lock.lock().await;
        match self.run_once(supervisor, data).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_status(NodeStatus::Failed);
                self.report(
                    ChainSignal::NodeFailed,
                    Some(json!({ "error": e.to_string() })),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn run_once(&self, supervisor: &NodeSupervisor, mut data: Value) -> Result<()> {
        // A resume armed by the status manager takes over the execution.
        let resume = self.status_manager.lock().take_resume();
        if let Some(resume) = resume {
            return self.run_resumed(supervisor, resume).await;
        }

        if let Some(child_config) = self.config.chain_config.clone() {
            self.expand_child_chain(supervisor, child_config, &data)
                .await?;
        }

        if !self.config.pre.is_empty() {
            data = self.run_pre_stage(supervisor, data).await;
        }

        self.transition(NodeStatus::InProgress).await;
        {
            let mut state = self.state.lock();
            state.output.clear();
            state.progress = 0.0;
        }

        self.run_batches(supervisor, data, 0).await
    }

    async fn run_resumed(&self, supervisor: &NodeSupervisor, resume: ResumeState) -> Result<()> {
        info!(node_id = %self.id, "resuming suspended execution");
        self.transition(NodeStatus::InProgress).await;

        match resume.payload.data {
            // A resume payload replaces the generator advance entirely: the
            // node terminates with the payload as its canonical output.
            Some(data) => {
                {
                    let mut state = self.state.lock();
                    state.output = vec![json!({
                        "data": data,
                        "previousNodeParams": resume.payload.params,
                    })];
                    state.progress = 1.0;
                }
                self.complete(supervisor).await
            }
            // Without a payload the batch loop picks up at the saved cursor
            // over the stashed data, keeping the earlier outputs.
            None => {
                self.run_batches(supervisor, resume.suspended.data, resume.suspended.next_batch)
                    .await
            }
        }
    }

    async fn run_batches(
        &self,
        supervisor: &NodeSupervisor,
        data: Value,
        start_batch: usize,
    ) -> Result<()> {
        let ctx = self.pipeline_context();
        let total = self.pipelines.len();
        let batches = Self::batches(total);

        let mut batch_index = start_batch;
        while batch_index < batches.len() {
            let batch = &batches[batch_index];
            let runs = batch
                .iter()
                .map(|&i| self.pipelines[i].run(data.clone(), &ctx));
            let results = futures::future::try_join_all(runs).await?;

            {
                let mut state = self.state.lock();
                for result in results {
                    state.output.push(result);
                    state.progress = (state.progress + 1.0 / total as f64).min(1.0);
                }
            }
            batch_index += 1;
            self.report(
                ChainSignal::NodeInProgress,
                Some(json!({ "progress": self.progress() })),
            )
            .await;

            // Inter-batch checkpoint: the only suspension point.
            let signals = self.status_manager.lock().process();
            self.apply_status_signals(&signals);
            if signals.contains(&NodeSignal::Suspend) {
                self.status_manager.lock().suspend(SuspendedState {
                    next_batch: batch_index,
                    last_batch: batch.clone(),
                    data: data.clone(),
                });
                self.transition(NodeStatus::Suspended).await;
                return Ok(());
            }
        }

        self.complete(supervisor).await
    }

    async fn complete(&self, supervisor: &NodeSupervisor) -> Result<()> {
        self.transition(NodeStatus::Completed).await;
        self.terminate(supervisor).await
    }

    /// Hand the canonical output off to the next stage and apply retention
    async fn terminate(&self, supervisor: &NodeSupervisor) -> Result<()> {
        let data = self
            .state
            .lock()
            .output
            .first()
            .cloned()
            .unwrap_or(Value::Null);
        self.move_to_next_node(supervisor, data).await?;
        self.apply_deletion_policy(supervisor).await;
        Ok(())
    }

    async fn move_to_next_node(&self, supervisor: &NodeSupervisor, data: Value) -> Result<()> {
        match self.next_node_info() {
            Some(NextNodeInfo::Local { node_id }) => {
                debug!(from = %self.id, to = %node_id, "handing off to local node");
                // This node already completed; a downstream failure is its
                // own and surfaces on the monitoring stream.
                if let Err(e) = supervisor.run_node(&node_id, data).await {
                    warn!(from = %self.id, to = %node_id, error = %e, "downstream node failed");
                }
                Ok(())
            }
            Some(NextNodeInfo::Remote {
                target_id,
                meta,
                resolver,
            }) => {
                debug!(from = %self.id, %target_id, "handing off to remote service");
                let mut meta = meta;
                if let Some(resolver) = resolver {
                    meta.get_or_insert_with(Default::default).resolver.get_or_insert(resolver);
                }
                let payload = ServicePayload {
                    chain_id: self.config.chain_id.clone().unwrap_or_default(),
                    target_id,
                    meta,
                    data,
                };
                match supervisor.callbacks().remote_service.as_ref() {
                    Some(callback) => {
                        // Best-effort forward; the transport owns retries.
                        if let Err(e) = callback.remote_service(payload).await {
                            warn!(node_id = %self.id, error = %e, "remote hand-off failed");
                        }
                    }
                    None => warn!(node_id = %self.id, "no remote-service callback registered"),
                }
                Ok(())
            }
            None => {
                self.report(ChainSignal::NodeEndOfPipeline, Some(json!({ "data": data })))
                    .await;
                Ok(())
            }
        }
    }

    async fn apply_deletion_policy(&self, supervisor: &NodeSupervisor) {
        let chain_type = self.config.chain_type;
        if chain_type.is_persistent() {
            return;
        }
        if chain_type.is_auto_delete() {
            if let Err(e) = supervisor.delete_node(&self.id) {
                warn!(node_id = %self.id, error = %e, "auto-delete failed");
            }
        } else {
            self.report(ChainSignal::NodePendingDeletion, None).await;
        }
    }

    /// Deploy and start the node's child chain
    async fn expand_child_chain(
        &self,
        supervisor: &NodeSupervisor,
        child_config: Vec<NodeConfig>,
        data: &Value,
    ) -> Result<()> {
        let child_id = supervisor
            .deploy_chain(child_config, data.clone(), self.config.chain_id.clone())
            .await?;
        supervisor.start_pending_chain(&child_id).await
    }

    /// Run the pre-stage sub-chain and merge its result into the data
    async fn run_pre_stage(&self, supervisor: &NodeSupervisor, data: Value) -> Value {
        let Some(chain_config) = self.config.pre.iter().find(|list| !list.is_empty()) else {
            return data;
        };
        let Some(callback) = supervisor.callbacks().broadcast_pre.as_ref() else {
            warn!(node_id = %self.id, "no broadcast-pre callback registered");
            return data;
        };

        let message = PreMessage {
            chain_id: self.config.chain_id.clone(),
            chain_config: chain_config.clone(),
            data: data.clone(),
        };
        match callback.broadcast_pre(message).await {
            Ok(pre_data) if !pre_data.is_null() => Self::merge_pre_data(data, pre_data),
            Ok(_) => data,
            Err(e) => {
                warn!(node_id = %self.id, error = %e, "pre-stage broadcast failed");
                data
            }
        }
    }

    /// Merge a pre-stage result into the outgoing data
    ///
    /// Existing `additionalData` is appended to; otherwise the original
    /// value moves under `origin` and a fresh `additionalData` list starts.
    fn merge_pre_data(data: Value, pre_data: Value) -> Value {
        match data {
            Value::Object(mut map) if map.contains_key("additionalData") => {
                if let Some(Value::Array(additional)) = map.get_mut("additionalData") {
                    additional.push(pre_data);
                }
                Value::Object(map)
            }
            other => json!({ "origin": other, "additionalData": [pre_data] }),
        }
    }

    async fn transition(&self, status: NodeStatus) {
        self.set_status(status);
        self.report(ChainSignal::from(status), None).await;
    }

    fn apply_status_signals(&self, signals: &[NodeSignal]) {
        for signal in signals {
            if let NodeSignal::Status(status) = signal {
                self.set_status(*status);
            }
        }
    }

    fn pipeline_context(&self) -> PipelineContext {
        let (next_target_id, next_node_resolver) = match self.next_node_info() {
            Some(NextNodeInfo::Remote {
                target_id,
                meta,
                resolver,
            }) => (
                Some(target_id),
                resolver.or_else(|| meta.and_then(|m| m.resolver)),
            ),
            _ => (
                self.config.next_target_id.clone(),
                self.config.next_node_resolver.clone(),
            ),
        };
        PipelineContext {
            chain_id: self.config.chain_id.clone(),
            next_target_id,
            next_node_resolver,
        }
    }

    /// Pipeline indices grouped into batches of `BATCH_SIZE`
    fn batches(total: usize) -> Vec<Vec<usize>> {
        (0..total)
            .collect::<Vec<_>>()
            .chunks(BATCH_SIZE)
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("pipelines", &self.pipelines.len())
            .finish()
    }
}

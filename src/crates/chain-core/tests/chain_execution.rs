//! End-to-end chain execution over stub callbacks

use async_trait::async_trait;
use chain_core::{
    BroadcastPre, BroadcastSetup, CallbackPayload, ChainError, ChainSignal, ChainType,
    Location, NodeConfig, NodeSignal, NodeStatus, NodeSupervisor, PipelineMeta, PreMessage,
    ProcessCallback, RemoteService, ReportMessage, ResumePayload, Result, ServiceConfig,
    ServicePayload, SetupMessage, StatusMessage, StatusTarget, SupervisorCallbacks,
    SupervisorRequest,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Process callback echoing its input
struct Echo;

#[async_trait]
impl ProcessCallback for Echo {
    async fn digest(&self, payload: CallbackPayload) -> Result<Value> {
        Ok(payload.data)
    }
}

/// Process callback recording every payload it sees
struct Recording {
    payloads: Mutex<Vec<CallbackPayload>>,
}

impl Recording {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            payloads: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ProcessCallback for Recording {
    async fn digest(&self, payload: CallbackPayload) -> Result<Value> {
        let data = payload.data.clone();
        self.payloads.lock().push(payload);
        Ok(data)
    }
}

struct RecordingSetup {
    messages: Mutex<Vec<SetupMessage>>,
}

impl RecordingSetup {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl BroadcastSetup for RecordingSetup {
    async fn broadcast_setup(&self, message: SetupMessage) -> Result<()> {
        self.messages.lock().push(message);
        Ok(())
    }
}

struct RecordingRemote {
    payloads: Mutex<Vec<ServicePayload>>,
}

impl RecordingRemote {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            payloads: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl RemoteService for RecordingRemote {
    async fn remote_service(&self, payload: ServicePayload) -> Result<()> {
        self.payloads.lock().push(payload);
        Ok(())
    }
}

struct StubPre {
    response: Value,
    messages: Mutex<Vec<PreMessage>>,
}

impl StubPre {
    fn new(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response,
            messages: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl BroadcastPre for StubPre {
    async fn broadcast_pre(&self, message: PreMessage) -> Result<Value> {
        self.messages.lock().push(message);
        Ok(self.response.clone())
    }
}

fn local(services: &[&str]) -> NodeConfig {
    NodeConfig::new(services.iter().map(|s| ServiceConfig::new(*s)).collect())
}

fn echo_supervisor(uid: &str) -> Arc<NodeSupervisor> {
    NodeSupervisor::new(uid, SupervisorCallbacks::new().with_process(Arc::new(Echo)))
}

fn drain(rx: &mut broadcast::Receiver<ReportMessage>) -> Vec<ReportMessage> {
    let mut events = Vec::new();
    while let Ok(message) = rx.try_recv() {
        events.push(message);
    }
    events
}

fn count(events: &[ReportMessage], signal: ChainSignal) -> usize {
    events.iter().filter(|m| m.signal == signal).count()
}

async fn wait_for_signal(
    rx: &mut broadcast::Receiver<ReportMessage>,
    signal: ChainSignal,
) -> ReportMessage {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let message = rx.recv().await.expect("report stream closed");
            if message.signal == signal {
                return message;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} not observed in time", signal))
}

#[tokio::test]
async fn test_local_two_node_chain() {
    let supervisor = echo_supervisor("host-a");
    let mut rx = supervisor.monitoring().subscribe();

    let chain_id = supervisor
        .deploy_chain(vec![local(&["svc-A"]), local(&["svc-B"])], json!({"k": 1}), None)
        .await
        .unwrap();
    supervisor.start_chain(&chain_id, None).await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(count(&events, ChainSignal::NodeSetupCompleted), 2);
    assert_eq!(count(&events, ChainSignal::NodeCompleted), 2);
    assert_eq!(count(&events, ChainSignal::ChainDeployed), 1);
    assert_eq!(count(&events, ChainSignal::NodeEndOfPipeline), 1);

    // Completion lands in strict index order along the local segment.
    let completed: Vec<usize> = events
        .iter()
        .filter(|m| m.signal == ChainSignal::NodeCompleted)
        .map(|m| m.index)
        .collect();
    assert_eq!(completed, vec![0, 1]);

    // The second node's first activity follows the first node's completion.
    let first_completed = events
        .iter()
        .position(|m| m.signal == ChainSignal::NodeCompleted && m.index == 0)
        .unwrap();
    let second_started = events
        .iter()
        .position(|m| m.signal == ChainSignal::NodeInProgress && m.index == 1)
        .unwrap();
    assert!(first_completed < second_started);

    // Default chain type auto-deletes handed-off nodes.
    assert_eq!(supervisor.node_count(), 0);
}

#[tokio::test]
async fn test_mixed_local_remote_distribution() {
    let setup = RecordingSetup::new();
    let remote = RecordingRemote::new();
    let callbacks = SupervisorCallbacks::new()
        .with_process(Arc::new(Echo))
        .with_broadcast_setup(setup.clone())
        .with_remote_service(remote.clone());
    let supervisor = NodeSupervisor::new("host-a", callbacks);

    let remote_config = NodeConfig::new(vec![ServiceConfig::new("http://h:9/svc").with_meta(
        PipelineMeta {
            resolver: Some("http://h:9/".to_string()),
            configuration: None,
        },
    )])
    .with_location(Location::Remote);

    let chain_id = supervisor
        .deploy_chain(vec![local(&["L"]), remote_config], json!({"k": 1}), None)
        .await
        .unwrap();

    // One setup broadcast for the one remote stage.
    {
        let messages = setup.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].chain_id, chain_id);
        assert_eq!(
            messages[0].remote_configs.first_service().unwrap().target_id,
            "http://h:9/svc"
        );
        assert!(messages[0].remote_configs.next_target_id.is_none());
    }

    supervisor.start_chain(&chain_id, None).await.unwrap();

    // The local node handed its output to the remote hop.
    let payloads = remote.payloads.lock();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].chain_id, chain_id);
    assert_eq!(payloads[0].target_id, "http://h:9/svc");
    assert_eq!(payloads[0].data, json!({"k": 1}));
    assert_eq!(
        payloads[0].meta.as_ref().unwrap().resolver.as_deref(),
        Some("http://h:9/")
    );
}

#[tokio::test]
async fn test_remote_side_setup_and_run() {
    // The receiving supervisor registers the config and forwards onward.
    let remote = RecordingRemote::new();
    let callbacks = SupervisorCallbacks::new()
        .with_process(Arc::new(Echo))
        .with_remote_service(remote.clone());
    let supervisor = NodeSupervisor::new("host-b", callbacks);

    let mut config = local(&["svc-R"]);
    config.index = Some(1);
    config.count = Some(3);
    config.next_target_id = Some("http://h2:9/next".to_string());
    config.next_node_resolver = Some("http://h2:9".to_string());

    let response = supervisor
        .handle_request(SupervisorRequest::NodeSetup {
            chain_id: "chain-x".to_string(),
            config: Box::new(config),
        })
        .await
        .unwrap();
    let node_id = response.node_id.unwrap();
    assert!(supervisor.node(&node_id).is_some());

    supervisor
        .handle_request(SupervisorRequest::NodeSendData {
            chain_id: "chain-x".to_string(),
            target_id: "svc-R".to_string(),
            data: json!({"hop": 2}),
        })
        .await
        .unwrap();

    let payloads = remote.payloads.lock();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].target_id, "http://h2:9/next");
    assert_eq!(payloads[0].data, json!({"hop": 2}));
}

#[tokio::test]
async fn test_parallel_child_chain() {
    let supervisor = echo_supervisor("host-a");
    let mut rx = supervisor.monitoring().subscribe();

    let mut child_root = local(&["child-svc"]);
    child_root.child_mode = Some(chain_core::ChildMode::Parallel);
    let mut parent = local(&["parent-svc"]);
    parent.chain_config = Some(vec![child_root]);

    let chain_id = supervisor
        .deploy_chain(vec![parent], json!({"k": 1}), None)
        .await
        .unwrap();
    supervisor.start_chain(&chain_id, None).await.unwrap();

    // The parent finished its own pipeline without waiting on the child.
    let started = wait_for_signal(&mut rx, ChainSignal::ChildChainStarted).await;
    assert_eq!(started.chain_id, chain_id);
    wait_for_signal(&mut rx, ChainSignal::ChildChainCompleted).await;

    let child_ids = supervisor.child_chains(&chain_id);
    assert_eq!(child_ids.len(), 1);
    assert_ne!(child_ids[0], chain_id);
}

#[tokio::test]
async fn test_serial_child_chain_blocks_parent() {
    let supervisor = echo_supervisor("host-a");
    let mut rx = supervisor.monitoring().subscribe();

    let mut parent = local(&["parent-svc"]);
    parent.chain_config = Some(vec![local(&["child-svc"])]);

    let chain_id = supervisor
        .deploy_chain(vec![parent], json!({"k": 1}), None)
        .await
        .unwrap();
    supervisor.start_chain(&chain_id, None).await.unwrap();

    // Serial children complete before the parent's own pipelines run.
    let events = drain(&mut rx);
    let child_completed = events
        .iter()
        .position(|m| m.signal == ChainSignal::ChildChainCompleted)
        .unwrap();
    let parent_completed = events
        .iter()
        .position(|m| m.signal == ChainSignal::NodeCompleted && m.chain_id == chain_id)
        .unwrap();
    assert!(child_completed < parent_completed);
}

#[tokio::test]
async fn test_pre_stage_injection() {
    let recording = Recording::new();
    let pre = StubPre::new(json!({"y": 2}));
    let callbacks = SupervisorCallbacks::new()
        .with_process(recording.clone())
        .with_broadcast_pre(pre.clone());
    let supervisor = NodeSupervisor::new("host-a", callbacks);

    let mut config = local(&["svc-A"]);
    config.pre = vec![vec![
        NodeConfig::new(vec![ServiceConfig::new("pre1")]),
        local(&["next"]),
    ]];

    let chain_id = supervisor
        .deploy_chain(vec![config], json!({"x": 1}), None)
        .await
        .unwrap();
    supervisor.start_chain(&chain_id, None).await.unwrap();

    // Exactly one pre broadcast carrying the whole inner sub-chain.
    {
        let messages = pre.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].chain_config.len(), 2);
        assert_eq!(messages[0].data, json!({"x": 1}));
    }

    // The node's own pipeline saw the merged value.
    let payloads = recording.payloads.lock();
    assert_eq!(payloads.len(), 1);
    assert_eq!(
        payloads[0].data,
        json!({"origin": {"x": 1}, "additionalData": [{"y": 2}]})
    );
}

#[tokio::test]
async fn test_suspend_then_resume_with_payload() {
    let supervisor = echo_supervisor("host-a");
    let mut rx = supervisor.monitoring().subscribe();

    let mut config = local(&["s1", "s2", "s3", "s4", "s5", "s6"]);
    config.chain_type = ChainType::PERSISTENT;
    config.signal_queue = Some(vec![NodeSignal::Suspend]);

    let chain_id = supervisor
        .deploy_chain(vec![config], json!({"k": 1}), None)
        .await
        .unwrap();
    supervisor.start_chain(&chain_id, None).await.unwrap();

    // Suspended after the first batch of three, outputs preserved.
    let node = supervisor
        .find_nodes_by_target(&chain_id, "s1")
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(node.status(), NodeStatus::Suspended);
    assert_eq!(node.output().len(), 3);
    assert!(node.progress() < 1.0);
    wait_for_signal(&mut rx, ChainSignal::NodeSuspended).await;

    supervisor
        .enqueue_node_status(
            StatusMessage {
                chain_id: chain_id.clone(),
                signal: NodeSignal::Resume,
                payload: StatusTarget {
                    target_id: "s1".to_string(),
                    host_uri: None,
                },
            },
            Some(ResumePayload {
                data: Some(json!({"z": 9})),
                params: Some(json!({"from": "operator"})),
            }),
        )
        .await
        .unwrap();

    wait_for_signal(&mut rx, ChainSignal::NodeCompleted).await;
    assert_eq!(node.status(), NodeStatus::Completed);
    assert_eq!(
        node.output(),
        vec![json!({"data": {"z": 9}, "previousNodeParams": {"from": "operator"}})]
    );
}

#[tokio::test]
async fn test_suspend_resume_round_trip_matches_straight_run() {
    let services = ["s1", "s2", "s3", "s4", "s5", "s6"];

    // Straight run.
    let supervisor = echo_supervisor("host-a");
    let mut config = local(&services);
    config.chain_type = ChainType::PERSISTENT;
    let chain_id = supervisor
        .deploy_chain(vec![config], json!({"k": 1}), None)
        .await
        .unwrap();
    supervisor.start_chain(&chain_id, None).await.unwrap();
    let straight = supervisor
        .find_nodes_by_target(&chain_id, "s1")
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(straight.status(), NodeStatus::Completed);
    assert_eq!(straight.output().len(), services.len());

    // Suspended-at-batch-one run, resumed without payload.
    let supervisor = echo_supervisor("host-b");
    let mut rx = supervisor.monitoring().subscribe();
    let mut config = local(&services);
    config.chain_type = ChainType::PERSISTENT;
    config.signal_queue = Some(vec![NodeSignal::Suspend]);
    let chain_id = supervisor
        .deploy_chain(vec![config], json!({"k": 1}), None)
        .await
        .unwrap();
    supervisor.start_chain(&chain_id, None).await.unwrap();

    let node = supervisor
        .find_nodes_by_target(&chain_id, "s1")
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(node.status(), NodeStatus::Suspended);

    supervisor
        .enqueue_node_status(
            StatusMessage {
                chain_id: chain_id.clone(),
                signal: NodeSignal::Resume,
                payload: StatusTarget {
                    target_id: "s1".to_string(),
                    host_uri: None,
                },
            },
            None,
        )
        .await
        .unwrap();
    wait_for_signal(&mut rx, ChainSignal::NodeCompleted).await;

    assert_eq!(node.output(), straight.output());
    assert!((node.progress() - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_resume_without_suspension_is_noop() {
    let supervisor = echo_supervisor("host-a");
    let mut config = local(&["svc-A"]);
    config.chain_type = ChainType::PERSISTENT;
    let chain_id = supervisor
        .deploy_chain(vec![config], json!({}), None)
        .await
        .unwrap();
    supervisor.start_chain(&chain_id, None).await.unwrap();

    let node = supervisor
        .find_nodes_by_target(&chain_id, "svc-A")
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(node.status(), NodeStatus::Completed);

    supervisor
        .enqueue_node_status(
            StatusMessage {
                chain_id,
                signal: NodeSignal::Resume,
                payload: StatusTarget {
                    target_id: "svc-A".to_string(),
                    host_uri: None,
                },
            },
            None,
        )
        .await
        .unwrap();
    // Still completed; the stray resume changed nothing.
    assert_eq!(node.status(), NodeStatus::Completed);
}

#[tokio::test]
async fn test_routing_miss_produces_no_events() {
    let supervisor = echo_supervisor("host-a");
    let mut rx = supervisor.monitoring().subscribe();

    let err = supervisor
        .handle_request(SupervisorRequest::NodeSendData {
            chain_id: "unknown".to_string(),
            target_id: "ghost".to_string(),
            data: json!({}),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::RoutingMiss(_)));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_processor_failure_flips_node_to_failed() {
    struct Failing;

    #[async_trait]
    impl ProcessCallback for Failing {
        async fn digest(&self, payload: CallbackPayload) -> Result<Value> {
            Err(ChainError::ProcessorFailure(payload.target_id))
        }
    }

    let supervisor = NodeSupervisor::new(
        "host-a",
        SupervisorCallbacks::new().with_process(Arc::new(Failing)),
    );
    let mut rx = supervisor.monitoring().subscribe();

    let mut config = local(&["svc-A"]);
    config.chain_type = ChainType::PERSISTENT;
    let chain_id = supervisor
        .deploy_chain(vec![config], json!({}), None)
        .await
        .unwrap();
    let err = supervisor.start_chain(&chain_id, None).await.unwrap_err();
    assert!(matches!(err, ChainError::ProcessorFailure(_)));

    let node = supervisor
        .find_nodes_by_target(&chain_id, "svc-A")
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(node.status(), NodeStatus::Failed);

    let events = drain(&mut rx);
    assert_eq!(count(&events, ChainSignal::NodeFailed), 1);
    assert_eq!(count(&events, ChainSignal::NodeCompleted), 0);
}

#[tokio::test]
async fn test_progress_is_monotone_until_completion() {
    let supervisor = echo_supervisor("host-a");
    let mut rx = supervisor.monitoring().subscribe();

    let mut config = local(&["s1", "s2", "s3", "s4", "s5", "s6", "s7"]);
    config.chain_type = ChainType::PERSISTENT;
    let chain_id = supervisor
        .deploy_chain(vec![config], json!({}), None)
        .await
        .unwrap();
    supervisor.start_chain(&chain_id, None).await.unwrap();

    let progress: Vec<f64> = drain(&mut rx)
        .iter()
        .filter_map(|m| m.payload.as_ref()?.get("progress")?.as_f64())
        .collect();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!((progress.last().unwrap() - 1.0).abs() < 1e-9);
}

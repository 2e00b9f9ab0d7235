//! Two-host round trip over the loopback connector surface

use async_trait::async_trait;
use chain_connector::api::create_router;
use chain_connector::{HttpBroadcastSetup, HttpRemoteService};
use chain_core::{
    CallbackPayload, ChainSignal, Location, NodeConfig, NodeSupervisor, PipelineMeta,
    ProcessCallback, Result, ServiceConfig, SupervisorCallbacks,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct Echo;

#[async_trait]
impl ProcessCallback for Echo {
    async fn digest(&self, payload: CallbackPayload) -> Result<Value> {
        Ok(payload.data)
    }
}

/// Serve a connector for a supervisor on an ephemeral loopback port
async fn serve(supervisor: Arc<NodeSupervisor>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(supervisor);
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_chain_spans_two_connectors() {
    // Host B: plain echo supervisor behind a connector.
    let host_b = NodeSupervisor::new("host-b", SupervisorCallbacks::new().with_process(Arc::new(Echo)));
    let base_b = serve(host_b.clone()).await;
    let mut rx_b = host_b.monitoring().subscribe();

    // Host A: echo supervisor whose outbound callbacks go over HTTP.
    let client = reqwest::Client::new();
    let host_a = NodeSupervisor::new(
        "host-a",
        SupervisorCallbacks::new()
            .with_process(Arc::new(Echo))
            .with_broadcast_setup(Arc::new(HttpBroadcastSetup::new(client.clone())))
            .with_remote_service(Arc::new(HttpRemoteService::new(client))),
    );

    let remote_target = format!("{}/svc", base_b);
    let remote_stage = NodeConfig::new(vec![ServiceConfig::new(remote_target).with_meta(
        PipelineMeta {
            resolver: Some(base_b.clone()),
            configuration: None,
        },
    )])
    .with_location(Location::Remote);
    let local_stage = NodeConfig::new(vec![ServiceConfig::new("svc-L")]);

    let chain_id = host_a
        .deploy_chain(vec![local_stage, remote_stage], json!({"k": 1}), None)
        .await
        .unwrap();
    host_a.start_chain(&chain_id, None).await.unwrap();

    // Host B received the setup, then the data, and finished the chain.
    let end = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let message = rx_b.recv().await.expect("host-b report stream closed");
            if message.signal == ChainSignal::NodeEndOfPipeline {
                return message;
            }
        }
    })
    .await
    .expect("end of pipeline not observed");

    assert_eq!(end.chain_id, chain_id);
    assert_eq!(end.payload.unwrap()["data"], json!({"k": 1}));
}

//! Default HTTP implementations of the supervisor's outbound callbacks
//!
//! Reference shims mapping each callback trait onto a JSON POST against the
//! conventional connector paths. Hosts are resolved through
//! [`resolve_host`]; a message whose host cannot be determined is dropped
//! with a warning, matching the core's best-effort broadcast policy.

use async_trait::async_trait;
use chain_core::{
    resolve_host, BroadcastPre, BroadcastSetup, CallbackPayload, ChainError, NodeStatusBroadcast,
    PreMessage, ProcessCallback, RemoteService, ReportMessage, ReportingSink, Result,
    ServicePayload, SetupMessage, StatusMessage, SupervisorCallbacks,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Path receiving remote stage configs
pub const SETUP_PATH: &str = "/node/communicate/setup";
/// Path receiving forwarded chain data
pub const RUN_PATH: &str = "/node/communicate/run";
/// Path receiving report messages on a monitoring host
pub const NOTIFY_PATH: &str = "/node/communicate/notify";
/// Path receiving relayed suspend/resume signals
pub const STATUS_PATH: &str = "/node/communicate/enqueue-status";
/// Path running a pre-stage callback
pub const PRE_PATH: &str = "/node/pre";

async fn post_json<T: Serialize>(
    client: &reqwest::Client,
    url: &str,
    body: &T,
) -> Result<Value> {
    debug!(%url, "connector POST");
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| ChainError::Transport(format!("POST {} failed: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ChainError::Transport(format!(
            "POST {} returned {}",
            url, status
        )));
    }

    let text = response
        .text()
        .await
        .map_err(|e| ChainError::Transport(format!("reading {} response failed: {}", url, e)))?;
    if text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| ChainError::Transport(format!("parsing {} response failed: {}", url, e)))
}

/// Distributes remote stage configs via POST to the setup path
pub struct HttpBroadcastSetup {
    client: reqwest::Client,
}

impl HttpBroadcastSetup {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BroadcastSetup for HttpBroadcastSetup {
    async fn broadcast_setup(&self, message: SetupMessage) -> Result<()> {
        let Some(host) = message
            .remote_configs
            .first_service()
            .and_then(|service| resolve_host(&service.target_id, service.meta.as_ref()))
        else {
            warn!(chain_id = %message.chain_id, "no host for remote setup, dropping");
            return Ok(());
        };
        post_json(&self.client, &format!("{}{}", host, SETUP_PATH), &message).await?;
        Ok(())
    }
}

/// Runs a pre-stage sub-chain via POST to the pre path
pub struct HttpBroadcastPre {
    client: reqwest::Client,
}

impl HttpBroadcastPre {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BroadcastPre for HttpBroadcastPre {
    async fn broadcast_pre(&self, message: PreMessage) -> Result<Value> {
        let Some(host) = message
            .chain_config
            .first()
            .and_then(|config| config.first_service())
            .and_then(|service| resolve_host(&service.target_id, service.meta.as_ref()))
        else {
            warn!("no host for pre-stage chain, dropping");
            return Ok(Value::Null);
        };
        let parsed = post_json(&self.client, &format!("{}{}", host, PRE_PATH), &message).await?;
        // The pre endpoint answers `{data}`; unwrap it when present.
        Ok(parsed.get("data").cloned().unwrap_or(parsed))
    }
}

/// Forwards chain data to the next hop via POST to the run path
pub struct HttpRemoteService {
    client: reqwest::Client,
}

impl HttpRemoteService {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteService for HttpRemoteService {
    async fn remote_service(&self, payload: ServicePayload) -> Result<()> {
        let Some(host) = resolve_host(&payload.target_id, payload.meta.as_ref()) else {
            warn!(target_id = %payload.target_id, "no host for remote service, dropping");
            return Ok(());
        };
        post_json(&self.client, &format!("{}{}", host, RUN_PATH), &payload).await?;
        Ok(())
    }
}

/// Relays suspend/resume signals via POST to the enqueue-status path
pub struct HttpNodeStatusBroadcast {
    client: reqwest::Client,
}

impl HttpNodeStatusBroadcast {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeStatusBroadcast for HttpNodeStatusBroadcast {
    async fn node_status(&self, message: StatusMessage) -> Result<()> {
        let Some(host) = message.payload.host_uri.clone() else {
            warn!(chain_id = %message.chain_id, "no host for status broadcast, dropping");
            return Ok(());
        };
        let mut relayed = message;
        // The receiving host resolves the target among its own nodes.
        relayed.payload.host_uri = Some("local".to_string());
        post_json(
            &self.client,
            &format!("{}{}", host.trim_end_matches('/'), STATUS_PATH),
            &relayed,
        )
        .await?;
        Ok(())
    }
}

/// Delivers report messages to a monitoring host via POST to the notify path
pub struct HttpReportingSink {
    client: reqwest::Client,
}

impl HttpReportingSink {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReportingSink for HttpReportingSink {
    async fn report(&self, host: &str, message: ReportMessage) -> Result<()> {
        let url = format!("{}{}", host.trim_end_matches('/'), NOTIFY_PATH);
        post_json(&self.client, &url, &message).await?;
        Ok(())
    }
}

/// Invokes the external service behind a target id via POST
pub struct HttpProcessCallback {
    client: reqwest::Client,
}

impl HttpProcessCallback {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProcessCallback for HttpProcessCallback {
    async fn digest(&self, payload: CallbackPayload) -> Result<Value> {
        post_json(&self.client, &payload.target_id.clone(), &payload)
            .await
            .map_err(|e| ChainError::ProcessorFailure(e.to_string()))
    }
}

/// Build the full default callback set over one shared HTTP client
pub fn http_callbacks() -> SupervisorCallbacks {
    let client = reqwest::Client::new();
    SupervisorCallbacks::new()
        .with_process(Arc::new(HttpProcessCallback::new(client.clone())))
        .with_pre_process(Arc::new(HttpProcessCallback::new(client.clone())))
        .with_broadcast_setup(Arc::new(HttpBroadcastSetup::new(client.clone())))
        .with_broadcast_pre(Arc::new(HttpBroadcastPre::new(client.clone())))
        .with_remote_service(Arc::new(HttpRemoteService::new(client.clone())))
        .with_node_status(Arc::new(HttpNodeStatusBroadcast::new(client.clone())))
        .with_reporting(Arc::new(HttpReportingSink::new(client)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_conventional() {
        assert_eq!(SETUP_PATH, "/node/communicate/setup");
        assert_eq!(RUN_PATH, "/node/communicate/run");
        assert_eq!(NOTIFY_PATH, "/node/communicate/notify");
        assert_eq!(STATUS_PATH, "/node/communicate/enqueue-status");
        assert_eq!(PRE_PATH, "/node/pre");
    }

    #[test]
    fn test_http_callbacks_fill_every_slot() {
        let callbacks = http_callbacks();
        assert!(callbacks.process.is_some());
        assert!(callbacks.pre_process.is_some());
        assert!(callbacks.broadcast_setup.is_some());
        assert!(callbacks.broadcast_pre.is_some());
        assert!(callbacks.remote_service.is_some());
        assert!(callbacks.node_status.is_some());
        assert!(callbacks.reporting.is_some());
    }
}

//! Request and response models of the connector API

use chain_core::{ChainConfig, NodeSignal};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /chain/create-and-start`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub chain_config: ChainConfig,
    #[serde(default)]
    pub data: Value,
}

/// Response of `POST /chain/create-and-start`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub chain_id: String,
    pub message: String,
}

/// Response of `POST /node/communicate/setup`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupResponse {
    pub node_id: String,
}

/// Response of `POST /node/pre`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreResponse {
    pub data: Value,
}

/// Body of `POST /node/resume` and `POST /node/suspend`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub target_id: String,
    pub chain_id: String,
    /// `"local"` (or absent) targets a node on this host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl StatusRequest {
    /// Turn this request into the matching supervisor request
    pub fn into_supervisor_request(self, signal: NodeSignal) -> chain_core::SupervisorRequest {
        match signal {
            NodeSignal::Resume => chain_core::SupervisorRequest::NodeResume {
                chain_id: self.chain_id,
                target_id: self.target_id,
                host_uri: self.host_uri,
                data: self.data,
                params: self.params,
            },
            _ => chain_core::SupervisorRequest::NodeSuspend {
                chain_id: self.chain_id,
                target_id: self.target_id,
                host_uri: self.host_uri,
            },
        }
    }
}

/// Response of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub supervisor: String,
}

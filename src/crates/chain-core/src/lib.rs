//! Core engine for distributed data-processing chains
//!
//! This crate provides the supervisor, node execution engine, status/signal
//! queue, chain distribution, and monitoring/reporting fan-in that together
//! drive a chain of processing nodes across one or more hosts. All outbound
//! communication (remote setup, data hand-off, status broadcast, reporting)
//! goes through injected callback traits; the core never assumes HTTP.

pub mod broadcast;
pub mod monitoring;
pub mod node;
pub mod pipeline;
pub mod processor;
pub mod reporting;
pub mod status;
pub mod supervisor;
pub mod types;

use thiserror::Error;

pub use broadcast::{
    BroadcastPre, BroadcastSetup, NodeStatusBroadcast, PreMessage, RemoteService, ReportingSink,
    ServicePayload, SetupMessage, StatusMessage, StatusTarget, resolve_host,
};
pub use monitoring::{MonitoringAgent, NodeTrack};
pub use node::Node;
pub use pipeline::{Pipeline, PipelineContext};
pub use processor::{ProcessCallback, Processor};
pub use reporting::{ReportMessage, ReportingAgent};
pub use status::{NodeStatusManager, ResumePayload, SuspendedState};
pub use supervisor::{NodeSupervisor, SupervisorCallbacks, SupervisorRequest, SupervisorResponse};
pub use types::{
    CallbackPayload, ChainConfig, ChainRelation, ChainSignal, ChainType, ChildMode, Location,
    NextNodeInfo, NodeConfig, NodeSignal, NodeStatus, PipelineMeta, ServiceConfig,
};

/// Errors that can occur while orchestrating a chain
#[derive(Debug, Error)]
pub enum ChainError {
    /// Chain or node configuration is unusable
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// No node or host could be resolved for a target
    #[error("no route for {0}")]
    RoutingMiss(String),

    /// An outbound call to a peer failed
    #[error("transport error: {0}")]
    Transport(String),

    /// A processor callback failed
    #[error("processor failed: {0}")]
    ProcessorFailure(String),

    /// An operation was attempted in a state that does not allow it
    #[error("invalid state: {0}")]
    StateViolation(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for chain operations
pub type Result<T> = std::result::Result<T, ChainError>;

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChainError::RoutingMiss("ghost/unknown".to_string());
        assert_eq!(err.to_string(), "no route for ghost/unknown");

        let err = ChainError::StateViolation("resume without suspension".to_string());
        assert!(err.to_string().contains("invalid state"));
    }

    #[test]
    fn test_error_from_serde() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ChainError = parse_err.into();
        assert!(matches!(err, ChainError::Serialization(_)));
    }

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}

//! Processor wrapping one outbound service call
//!
//! A processor does not talk to the network itself; it delegates to the
//! process callback injected at supervisor init. This keeps the execution
//! engine transport-agnostic.

use crate::types::{CallbackPayload, PipelineMeta, ServiceConfig};
use crate::{PipelineContext, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Callback invoked to digest data through one external service
#[async_trait]
pub trait ProcessCallback: Send + Sync {
    /// Invoke the service behind `payload.target_id` and return its output
    async fn digest(&self, payload: CallbackPayload) -> Result<Value>;
}

/// Wrapper over a single outbound service call
#[derive(Clone)]
pub struct Processor {
    target_id: String,
    meta: Option<PipelineMeta>,
    callback: Option<Arc<dyn ProcessCallback>>,
}

impl Processor {
    /// Create a processor for a service reference
    pub fn new(service: &ServiceConfig, callback: Option<Arc<dyn ProcessCallback>>) -> Self {
        Self {
            target_id: service.target_id.clone(),
            meta: service.meta.clone(),
            callback,
        }
    }

    /// Target id of the wrapped service
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Metadata carried through to the process callback
    pub fn meta(&self) -> Option<&PipelineMeta> {
        self.meta.as_ref()
    }

    /// Digest a data value through the wrapped service
    ///
    /// Returns the callback's result unchanged. Tolerates a missing callback
    /// by returning an empty value.
    pub async fn digest(
        &self,
        data: Value,
        ctx: &PipelineContext,
        previous_target_id: Option<&str>,
    ) -> Result<Value> {
        let callback = match &self.callback {
            Some(callback) => callback,
            None => {
                warn!(
                    target_id = %self.target_id,
                    "no process callback registered, returning empty value"
                );
                return Ok(Value::Null);
            }
        };

        let payload = CallbackPayload {
            target_id: self.target_id.clone(),
            meta: self.meta.clone(),
            chain_id: ctx.chain_id.clone(),
            data,
            next_target_id: ctx.next_target_id.clone(),
            next_node_resolver: ctx.next_node_resolver.clone(),
            previous_target_id: previous_target_id.map(|s| s.to_string()),
        };

        callback.digest(payload).await
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("target_id", &self.target_id)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Recording {
        payloads: Mutex<Vec<CallbackPayload>>,
    }

    #[async_trait]
    impl ProcessCallback for Recording {
        async fn digest(&self, payload: CallbackPayload) -> Result<Value> {
            let data = payload.data.clone();
            self.payloads.lock().push(payload);
            Ok(data)
        }
    }

    #[tokio::test]
    async fn test_digest_builds_payload() {
        let recording = Arc::new(Recording {
            payloads: Mutex::new(Vec::new()),
        });
        let service = ServiceConfig::new("svc-A");
        let processor = Processor::new(&service, Some(recording.clone()));

        let ctx = PipelineContext {
            chain_id: Some("chain-1".to_string()),
            next_target_id: Some("svc-B".to_string()),
            next_node_resolver: None,
        };

        let out = processor
            .digest(json!({"k": 1}), &ctx, Some("svc-0"))
            .await
            .unwrap();
        assert_eq!(out, json!({"k": 1}));

        let payloads = recording.payloads.lock();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].target_id, "svc-A");
        assert_eq!(payloads[0].chain_id.as_deref(), Some("chain-1"));
        assert_eq!(payloads[0].next_target_id.as_deref(), Some("svc-B"));
        assert_eq!(payloads[0].previous_target_id.as_deref(), Some("svc-0"));
    }

    #[tokio::test]
    async fn test_digest_without_callback_returns_empty() {
        let service = ServiceConfig::new("svc-A");
        let processor = Processor::new(&service, None);
        let ctx = PipelineContext::default();

        let out = processor.digest(json!({"k": 1}), &ctx, None).await.unwrap();
        assert_eq!(out, Value::Null);
    }
}

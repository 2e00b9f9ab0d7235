//! Per-node status manager: signal queue and suspend/resume bookkeeping
//!
//! The manager owns a FIFO queue of control signals drained by the node at
//! inter-batch checkpoints, and preserves the execution cursor of a
//! suspended node so it can pick up exactly where it stopped.

use crate::types::NodeSignal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Saved execution cursor of a suspended node
///
/// Suspension between batches *k* and *k+1* stores `next_batch = k+1`; a
/// resume without payload re-enters the batch loop there over `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct SuspendedState {
    /// Index of the next batch to schedule
    pub next_batch: usize,
    /// Pipeline indices of the last completed batch
    pub last_batch: Vec<usize>,
    /// Data value the execution was digesting
    pub data: Value,
}

/// Payload delivered alongside a resume signal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePayload {
    /// Replacement input; when set, the node terminates with it directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Carried through as `previousNodeParams` on the node's output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A consumed resume: the stashed cursor plus the payload that cleared it
#[derive(Debug, Clone)]
pub struct ResumeState {
    pub suspended: SuspendedState,
    pub payload: ResumePayload,
}

/// FIFO queue of control signals driving one node's state machine
#[derive(Debug, Default)]
pub struct NodeStatusManager {
    queue: VecDeque<NodeSignal>,
    suspended: Option<SuspendedState>,
    pending_resume_payload: Option<ResumePayload>,
    armed_resume: Option<ResumeState>,
}

impl NodeStatusManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Append signals to the queue
    ///
    /// A resume payload, when given, is held until a `NODE_RESUME` signal is
    /// processed.
    pub fn enqueue_signals(&mut self, signals: Vec<NodeSignal>, resume_payload: Option<ResumePayload>) {
        if let Some(payload) = resume_payload {
            self.pending_resume_payload = Some(payload);
        }
        debug!(count = signals.len(), "enqueueing node signals");
        self.queue.extend(signals);
    }

    /// Drain the queue, applying suspend/resume, and return the effective signals
    ///
    /// `NODE_RESUME` without a preserved suspension is a no-op with a
    /// warning. Signals other than suspend/resume pass through for the
    /// node's status setter.
    pub fn process(&mut self) -> Vec<NodeSignal> {
        let mut effective = Vec::with_capacity(self.queue.len());
        while let Some(signal) = self.queue.pop_front() {
            match signal {
                NodeSignal::Resume => match self.suspended.take() {
                    Some(suspended) => {
                        let payload = self.pending_resume_payload.take().unwrap_or_default();
                        self.armed_resume = Some(ResumeState { suspended, payload });
                        effective.push(signal);
                    }
                    None => {
                        warn!("resume signal without suspended state, ignoring");
                    }
                },
                _ => effective.push(signal),
            }
        }
        effective
    }

    /// Stash the execution cursor of a suspension
    pub fn suspend(&mut self, state: SuspendedState) {
        debug!(next_batch = state.next_batch, "suspending execution");
        self.suspended = Some(state);
    }

    /// Whether a suspension is currently preserved
    pub fn is_suspended(&self) -> bool {
        self.suspended.is_some()
    }

    /// Whether a processed `NODE_RESUME` is waiting to be picked up
    pub fn resume_armed(&self) -> bool {
        self.armed_resume.is_some()
    }

    /// Take a resume armed by a processed `NODE_RESUME`
    pub fn take_resume(&mut self) -> Option<ResumeState> {
        self.armed_resume.take()
    }

    /// Number of queued, unprocessed signals
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeStatus;
    use serde_json::json;

    fn suspended_at(batch: usize) -> SuspendedState {
        SuspendedState {
            next_batch: batch,
            last_batch: vec![0, 1, 2],
            data: json!({"k": 1}),
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut manager = NodeStatusManager::new();
        manager.enqueue_signals(
            vec![NodeSignal::Suspend, NodeSignal::Status(NodeStatus::Failed)],
            None,
        );
        let drained = manager.process();
        assert_eq!(
            drained,
            vec![NodeSignal::Suspend, NodeSignal::Status(NodeStatus::Failed)]
        );
        assert_eq!(manager.queued(), 0);
    }

    #[test]
    fn test_resume_without_suspension_is_noop() {
        let mut manager = NodeStatusManager::new();
        manager.enqueue_signals(vec![NodeSignal::Resume], None);
        let drained = manager.process();
        assert!(drained.is_empty());
        assert!(manager.take_resume().is_none());
    }

    #[test]
    fn test_resume_consumes_payload_and_cursor() {
        let mut manager = NodeStatusManager::new();
        manager.suspend(suspended_at(2));
        assert!(manager.is_suspended());

        manager.enqueue_signals(
            vec![NodeSignal::Resume],
            Some(ResumePayload {
                data: Some(json!({"z": 9})),
                params: None,
            }),
        );
        let drained = manager.process();
        assert_eq!(drained, vec![NodeSignal::Resume]);
        assert!(!manager.is_suspended());

        let resume = manager.take_resume().unwrap();
        assert_eq!(resume.suspended.next_batch, 2);
        assert_eq!(resume.payload.data, Some(json!({"z": 9})));
        assert!(manager.take_resume().is_none());
    }

    #[test]
    fn test_resume_without_payload_keeps_stashed_data() {
        let mut manager = NodeStatusManager::new();
        manager.suspend(suspended_at(1));
        manager.enqueue_signals(vec![NodeSignal::Resume], None);
        manager.process();

        let resume = manager.take_resume().unwrap();
        assert_eq!(resume.payload, ResumePayload::default());
        assert_eq!(resume.suspended.data, json!({"k": 1}));
    }
}

//! Pipeline of processors executed left-to-right over a data value

use crate::processor::Processor;
use crate::Result;
use serde_json::Value;

/// Per-execution context shared by all processors of a node
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    pub chain_id: Option<String>,
    pub next_target_id: Option<String>,
    pub next_node_resolver: Option<String>,
}

/// Ordered sequence of processors
///
/// The output of step *i* is the input of step *i+1*. Processors share no
/// state other than the data value passed between them.
#[derive(Debug, Clone)]
pub struct Pipeline {
    processors: Vec<Processor>,
}

impl Pipeline {
    /// Create a pipeline from its processors
    pub fn new(processors: Vec<Processor>) -> Self {
        Self { processors }
    }

    /// Number of processors in this pipeline
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Whether the pipeline has no processors
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Fold a data value through every processor in order
    ///
    /// Any processor failure aborts the pipeline and propagates.
    pub async fn run(&self, mut data: Value, ctx: &PipelineContext) -> Result<Value> {
        let mut previous: Option<&str> = None;
        for processor in &self.processors {
            data = processor.digest(data, ctx, previous).await?;
            previous = Some(processor.target_id());
        }
        Ok(data)
    }
}

//! Node trait for streaming processing
//!
//! Every block in a flowgraph implements [`ProcessNode`]. The scheduler owns
//! the node, hands it its wired ports and drives `work()` on a dedicated thread.

pub use super::errors::{WorkError, WorkResult};
pub use super::ports::{InputPort, OutputPort, PortSchema};

/// A processing block in a flowgraph
/// - Sources have 0 inputs and N outputs
/// - Sinks have N inputs and 0 outputs
/// - Processors have N inputs and M outputs
pub trait ProcessNode: Send {
    /// Debug name, also used as the thread name
    fn name(&self) -> &str;

    /// Checked by the scheduler before every `work()` call
    fn should_stop(&self) -> bool {
        false
    }

    /// Returns true if this node spawns and manages its own worker threads.
    /// The scheduler then calls `work()` once and polls `should_stop()`.
    fn is_self_threading(&self) -> bool {
        false
    }

    /// Items a self-threading node's workers have handled so far. Read once
    /// the node ends; `None` keeps the count its `work()` call returned.
    fn items_processed(&self) -> Option<usize> {
        None
    }

    fn num_inputs(&self) -> usize;

    fn num_outputs(&self) -> usize;

    /// Schema for all input ports (name + type + index)
    fn input_schema(&self) -> Vec<PortSchema> {
        Vec::new()
    }

    /// Schema for all output ports (name + type + index)
    fn output_schema(&self) -> Vec<PortSchema> {
        Vec::new()
    }

    /// Read from inputs, process, write to outputs.
    ///
    /// Returns `Ok(n)` with the number of items consumed or produced.
    /// `Err(WorkError::Shutdown)` ends the node normally (end of stream).
    fn work(&mut self, inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize>;
}

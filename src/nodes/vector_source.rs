//! In-memory byte source

use tracing::{debug, info};

use crate::runtime::node::{InputPort, OutputPort, PortSchema, ProcessNode, WorkError, WorkResult};

/// Bytes sent per `work()` call
const CHUNK_SIZE: usize = 4096;

/// Source node that emits a fixed byte vector, then closes its output
///
/// With `with_repeat(true)` it loops over the data until the scheduler is
/// stopped. Output port: `"out"` (`u8`).
///
/// # Example
/// ```ignore
/// pipeline.add_process("source", VectorSource::new(vec![0x00, 0x55, 0x55]))?;
/// ```
pub struct VectorSource {
    name: String,
    data: Vec<u8>,
    repeat: bool,
    position: usize,
    finished: bool,
}

impl VectorSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            name: "vector_source".to_string(),
            data,
            repeat: false,
            position: 0,
            finished: false,
        }
    }

    /// Loop over the data forever instead of ending the stream
    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ProcessNode for VectorSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_stop(&self) -> bool {
        self.finished
    }

    fn num_inputs(&self) -> usize {
        0
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::output::<u8>("out", 0)]
    }

    fn work(&mut self, _inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let output = outputs
            .first()
            .and_then(|port| port.get::<u8>())
            .ok_or_else(|| WorkError::NodeError("Missing output".to_string()))?;

        if self.position == 0 {
            debug!("[{}] Emitting {} bytes (repeat={})", self.name, self.data.len(), self.repeat);
        }

        let end = (self.position + CHUNK_SIZE).min(self.data.len());
        let sent = match output.send_all(self.data[self.position..end].iter().copied()) {
            Ok(n) => n,
            Err(_) => {
                debug!("[{}] All receivers gone, stopping", self.name);
                self.finished = true;
                return Err(WorkError::Shutdown);
            }
        };
        self.position = end;

        if self.position >= self.data.len() {
            if self.repeat && !self.data.is_empty() {
                self.position = 0;
            } else {
                output.close();
                self.finished = true;
                info!("[{}] End of data, stream closed", self.name);
            }
        }

        Ok(sent)
    }
}

//! Binary visualization sink (`vizsink_b`)
//!
//! Consumes a `u8` stream and paints every bit, MSB first, as one dot on a
//! shared [`Raster`]: white for 1, black for 0. Start, end and drop bit
//! patterns control line breaks (see [`Framer`]).

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::config::VizConfig;
use crate::runtime::node::{InputPort, OutputPort, PortSchema, ProcessNode, WorkError, WorkResult};
use crate::viz::{BitPattern, Framer, Raster, SharedRaster};
use crate::Result;

/// Most bytes painted per `work()` call (and per raster lock)
const BATCH_SIZE: usize = 4096;

/// Sink node drawing a byte stream as a bit raster
///
/// Input port: `"in"` (`u8`). No outputs.
///
/// # Example
/// ```ignore
/// let sink = VizSink::new(100, 100, "", "", "", true)?;
/// let raster = sink.raster();
/// pipeline.add_process("sink", sink)?;
/// pipeline.connect("source", "out", "sink", "in")?;
/// ```
pub struct VizSink {
    name: String,
    framer: Framer,
    raster: SharedRaster,
    skip_zero_bytes: bool,
    flush_on_close: bool,

    input_buffer: VecDeque<u8>,
    batch: Vec<u8>,
    bytes_painted: u64,
    bytes_skipped: u64,
}

impl VizSink {
    /// Create a sink with a `width` x `height` raster.
    ///
    /// Pattern strings may be empty (pattern unused). A pattern containing
    /// anything but '0' and '1' is disabled with a warning; use
    /// [`VizSink::from_config`] to reject it instead.
    pub fn new(
        width: usize,
        height: usize,
        start_pattern: &str,
        end_pattern: &str,
        drop_pattern: &str,
        skip_zero_bytes: bool,
    ) -> Result<Self> {
        let raster = Raster::new(width, height)?;
        let framer = Framer::new(
            lenient_pattern("start", start_pattern),
            lenient_pattern("end", end_pattern),
            lenient_pattern("drop", drop_pattern),
        );
        debug!("VizSink {}x{} in {:?} mode", width, height, framer.mode());

        Ok(Self {
            name: "vizsink_b".to_string(),
            framer,
            raster: raster.shared(),
            skip_zero_bytes,
            flush_on_close: false,
            input_buffer: VecDeque::new(),
            batch: Vec::with_capacity(BATCH_SIZE),
            bytes_painted: 0,
            bytes_skipped: 0,
        })
    }

    /// Create a sink from a validated config
    pub fn from_config(config: &VizConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.width,
            config.height,
            &config.start_pattern,
            &config.end_pattern,
            &config.drop_pattern,
            config.skip_zero_bytes,
        )?
        .with_flush_on_close(config.flush_on_close))
    }

    /// Paint the bits still held for pattern matching when the stream ends
    pub fn with_flush_on_close(mut self, flush: bool) -> Self {
        self.flush_on_close = flush;
        self
    }

    /// Handle to the raster this sink paints
    pub fn raster(&self) -> SharedRaster {
        SharedRaster::clone(&self.raster)
    }

    fn paint_batch(&mut self) -> WorkResult<usize> {
        let mut raster = self
            .raster
            .lock()
            .map_err(|_| WorkError::NodeError("raster lock poisoned".to_string()))?;
        for &byte in &self.batch {
            if self.skip_zero_bytes && byte == 0 {
                self.bytes_skipped += 1;
                continue;
            }
            self.framer.consume(byte, &mut *raster);
            self.bytes_painted += 1;
        }
        Ok(self.batch.len())
    }

    fn finish(&mut self) {
        if self.flush_on_close && self.framer.pending() > 0 {
            match self.raster.lock() {
                Ok(mut raster) => {
                    debug!("[{}] Flushing {} pending bits", self.name, self.framer.pending());
                    self.framer.flush(&mut *raster);
                }
                Err(_) => warn!("[{}] Raster lock poisoned, pending bits lost", self.name),
            }
        }
        info!(
            "[{}] End of stream: {} bytes painted, {} zero bytes skipped",
            self.name, self.bytes_painted, self.bytes_skipped
        );
    }
}

fn lenient_pattern(kind: &str, text: &str) -> Option<BitPattern> {
    match BitPattern::parse(text) {
        Ok(pattern) => pattern,
        Err(e) => {
            warn!("Disabling {} pattern: {}", kind, e);
            None
        }
    }
}

impl ProcessNode for VizSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        0
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::input::<u8>("in", 0)]
    }

    fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
        self.batch.clear();
        let received = {
            let mut input = inputs
                .first()
                .and_then(|port| port.get::<u8>(&mut self.input_buffer))
                .ok_or_else(|| WorkError::NodeError("Missing input".to_string()))?;
            input.recv_batch(BATCH_SIZE, &mut self.batch)
        };

        match received {
            Ok(_) => self.paint_batch(),
            Err(WorkError::Shutdown) => {
                self.finish();
                Err(WorkError::Shutdown)
            }
            Err(e) => Err(e),
        }
    }
}

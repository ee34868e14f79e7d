//! Streaming bit visualizer with a thread-per-node flowgraph runtime
//!
//! Bytes flow from a source node into [`VizSink`], which unpacks them MSB
//! first and paints one dot per bit onto a grayscale [`Raster`]. Optional
//! start, end and drop bit patterns align the stream into one packet per
//! line, so repeated transmissions line up and can be compared by eye.
//!
//! # Architecture
//!
//! - **Sources**: [`VectorSource`] (in-memory bytes), [`FileSource`] (memory-mapped file)
//! - **VizSink**: the `vizsink_b` block; frames bits and paints the raster
//! - **Framer**: start/end/drop pattern handling
//! - **Raster**: dot canvas, exported as PGM, text or a live window (feature `gui`)
//! - **Pipeline / Scheduler**: thread-per-node execution over crossbeam channels
//!
//! # Example
//!
//! ```no_run
//! use binviz::{Pipeline, VectorSource, VizSink};
//!
//! let sink = VizSink::new(100, 100, "", "", "", true)?;
//! let raster = sink.raster();
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add_process("source", VectorSource::new(vec![0x00, 0x55, 0x55]))?;
//! pipeline.add_process("sink", sink)?;
//! pipeline.connect("source", "out", "sink", "in")?;
//! pipeline.run()?;
//!
//! print!("{}", raster.lock().unwrap().render_text());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use thiserror::Error;

pub mod config;
pub mod logging;
pub mod nodes;
pub mod runtime;
pub mod viz;

pub use config::{BinvizConfig, RuntimeConfig, ViewerConfig, VizConfig};

pub use nodes::{FileSource, VectorSource, VizSink};

pub use viz::{BitPattern, Canvas, FrameMode, Framer, Raster, Shade, SharedRaster, Stroke};

pub use runtime::{
    ConnectionError, InputPort, NodeOutcome, NodeReport, OutputPort, Pipeline, PipelineError, PortDirection,
    PortSchema, ProcessNode, RunReport, Scheduler, WorkError, WorkResult, register_type,
};

#[derive(Error, Debug)]
pub enum BinvizError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid bit pattern '{pattern}': unexpected character '{ch}' (only '0' and '1' allowed)")]
    InvalidPattern { pattern: String, ch: char },

    #[error("Invalid raster geometry {width}x{height}")]
    InvalidGeometry { width: usize, height: usize },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Viewer error: {0}")]
    Viewer(String),
}

impl From<ConnectionError> for BinvizError {
    fn from(err: ConnectionError) -> Self {
        BinvizError::Pipeline(err.into())
    }
}

pub type Result<T> = std::result::Result<T, BinvizError>;

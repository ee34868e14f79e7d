//! Flowgraph nodes
//!
//! - **Sources**: `VectorSource` (in-memory bytes), `FileSource` (memory-mapped file)
//! - **Sinks**: `VizSink`, the bit raster visualizer
//!
//! All byte streams use `u8` ports named `"out"` and `"in"`.

mod file_source;
mod vector_source;
mod viz_sink;

pub use file_source::FileSource;
pub use vector_source::VectorSource;
pub use viz_sink::VizSink;

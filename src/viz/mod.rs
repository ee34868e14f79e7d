//! Bit framing and the raster it paints
//!
//! - **bits**: bit patterns and the searchable bit queue
//! - **framer**: start/end/drop pattern handling, one packet per line
//! - **raster**: the dot canvas and its exports (PGM, text, RGB)
//! - **viewer**: live window over a shared raster (feature `gui`)

pub mod bits;
pub mod framer;
pub mod raster;
#[cfg(feature = "gui")]
pub mod viewer;

pub use bits::{BitPattern, BitQueue};
pub use framer::{Canvas, FrameMode, Framer, Stroke};
pub use raster::{Raster, Shade, SharedRaster};

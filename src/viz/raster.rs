//! Grayscale dot raster with a linear drawing cursor

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::framer::Canvas;
use crate::{BinvizError, Result};

/// Gray level of a dot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Shade {
    On = 255,
    Off = 0,
    Clear = 128,
}

impl Shade {
    pub fn level(self) -> u8 {
        self as u8
    }

    fn from_level(level: u8) -> Self {
        match level {
            255 => Shade::On,
            0 => Shade::Off,
            _ => Shade::Clear,
        }
    }
}

/// Raster shared between the sink that paints and whoever displays it
pub type SharedRaster = Arc<Mutex<Raster>>;

/// `width * height` dots, row-major. The cursor walks the dots in order and
/// wraps back to the top-left after the last one.
#[derive(Debug, Clone)]
pub struct Raster {
    width: usize,
    height: usize,
    dots: Vec<u8>,
    position: usize,
    revision: u64,
}

impl Raster {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BinvizError::InvalidGeometry { width, height });
        }
        let len = width
            .checked_mul(height)
            .ok_or(BinvizError::InvalidGeometry { width, height })?;
        let mut dots = Vec::new();
        if let Err(e) = dots.try_reserve_exact(len) {
            warn!("Cannot allocate a {}x{} raster: {}", width, height, e);
            return Err(BinvizError::InvalidGeometry { width, height });
        }
        dots.resize(len, Shade::Clear.level());
        Ok(Self {
            width,
            height,
            dots,
            position: 0,
            revision: 0,
        })
    }

    pub fn shared(self) -> SharedRaster {
        Arc::new(Mutex::new(self))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.dots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dots.is_empty()
    }

    /// Linear cursor position
    pub fn cursor(&self) -> usize {
        self.position
    }

    /// Cursor as (x, y)
    pub fn cursor_xy(&self) -> (usize, usize) {
        (self.position % self.width, self.position / self.width)
    }

    /// Bumped on every change; viewers redraw when it moves
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Raw gray levels, row-major
    pub fn dots(&self) -> &[u8] {
        &self.dots
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Shade> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(Shade::from_level(self.dots[y * self.width + x]))
    }

    pub fn set(&mut self, x: usize, y: usize, shade: Shade) {
        if x < self.width && y < self.height {
            self.set_at(y * self.width + x, shade);
        }
    }

    /// Paint the dot at a linear position; out of range is ignored
    pub fn set_at(&mut self, position: usize, shade: Shade) {
        if let Some(dot) = self.dots.get_mut(position) {
            *dot = shade.level();
            self.revision += 1;
        }
    }

    pub fn on(&mut self, x: usize, y: usize) {
        self.set(x, y, Shade::On);
    }

    pub fn off(&mut self, x: usize, y: usize) {
        self.set(x, y, Shade::Off);
    }

    pub fn clear(&mut self) {
        self.dots.fill(Shade::Clear.level());
        self.position = 0;
        self.revision += 1;
    }

    fn advance(&mut self) {
        self.position += 1;
        if self.position >= self.dots.len() {
            self.position = 0;
        }
    }

    /// Binary PGM (P5), one byte per dot
    pub fn write_pgm<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write!(writer, "P5\n{} {}\n255\n", self.width, self.height)?;
        writer.write_all(&self.dots)?;
        writer.flush()
    }

    /// '#' for on, '.' for off, ' ' for clear; one line per row
    pub fn render_text(&self) -> String {
        let mut out = String::with_capacity((self.width + 1) * self.height);
        for row in self.dots.chunks(self.width) {
            for &level in row {
                out.push(match Shade::from_level(level) {
                    Shade::On => '#',
                    Shade::Off => '.',
                    Shade::Clear => ' ',
                });
            }
            out.push('\n');
        }
        out
    }

    /// The whole raster scaled up by `zoom` as 0x00RRGGBB pixels, row major
    pub fn to_rgb_buffer(&self, zoom: usize) -> Vec<u32> {
        let zoom = zoom.max(1);
        let out_width = self.width * zoom;
        let mut buffer = vec![0u32; out_width * self.height * zoom];
        for (y, row) in self.dots.chunks(self.width).enumerate() {
            for (x, &level) in row.iter().enumerate() {
                let pixel = gray_to_rgb(level);
                for dy in 0..zoom {
                    let start = (y * zoom + dy) * out_width + x * zoom;
                    buffer[start..start + zoom].fill(pixel);
                }
            }
        }
        buffer
    }
}

/// Gray level as a 0x00RRGGBB pixel
pub fn gray_to_rgb(level: u8) -> u32 {
    let v = level as u32;
    (v << 16) | (v << 8) | v
}

impl Canvas for Raster {
    /// Paint at the cursor and advance it
    fn put_bit(&mut self, bit: bool) {
        let shade = if bit { Shade::On } else { Shade::Off };
        self.set_at(self.position, shade);
        self.advance();
    }

    /// Blank the rest of the row and move to the start of the next one.
    /// At column 0 this still skips a full row.
    fn new_line(&mut self) {
        let next = self.position - self.position % self.width + self.width;
        for pos in self.position..next {
            self.set_at(pos, Shade::Clear);
        }
        self.position = if next >= self.dots.len() { 0 } else { next };
    }
}

//! Live raster window
//!
//! Controls:
//!   Mouse wheel, +/-:  Zoom in / out (minimum 1x)
//!   Arrow keys:        Pan (Shift = fine)
//!   Home:              Back to the top-left corner
//!   Left click:        Pause and show the dot under the cursor
//!   Escape:            Resume
//!
//! The flowgraph keeps painting while paused; the held changes appear on resume.

use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};
use tracing::{debug, info};

use super::raster::{SharedRaster, gray_to_rgb};
use crate::config::ViewerConfig;
use crate::{BinvizError, Result};

pub const TITLE: &str = "BinViz, click or wheel";
pub const PAUSED_TITLE: &str = "Paused, ESC to continue";

const BG: u32 = 0x00333333;

/// Viewport over the raster: zoom factor plus the top-left dot shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub zoom: usize,
    pub scroll_x: usize,
    pub scroll_y: usize,
}

impl Viewport {
    pub fn new(zoom: usize) -> Self {
        Self {
            zoom: zoom.max(1),
            scroll_x: 0,
            scroll_y: 0,
        }
    }

    pub fn zoom_by(&mut self, steps: i32) {
        let zoom = self.zoom as i64 + steps as i64;
        self.zoom = zoom.max(1) as usize;
    }

    /// Dot under window pixel (px, py), if it lies on the raster
    pub fn dot_at(&self, px: usize, py: usize, width: usize, height: usize) -> Option<(usize, usize)> {
        let x = self.scroll_x + px / self.zoom;
        let y = self.scroll_y + py / self.zoom;
        (x < width && y < height).then_some((x, y))
    }

    /// Render `dots` (row-major gray levels) into a window framebuffer
    pub fn blit(&self, dots: &[u8], width: usize, height: usize, frame: &mut [u32], win_width: usize) {
        for (py, line) in frame.chunks_mut(win_width).enumerate() {
            for (px, pixel) in line.iter_mut().enumerate() {
                *pixel = match self.dot_at(px, py, width, height) {
                    Some((x, y)) => gray_to_rgb(dots[y * width + x]),
                    None => BG,
                };
            }
        }
    }
}

/// Open a window over `raster` and keep it updated until the user closes it.
///
/// Closing the window does not stop the flowgraph.
pub fn run(raster: SharedRaster, config: &ViewerConfig) -> Result<()> {
    let (width, height) = {
        let raster = raster.lock().map_err(|_| BinvizError::Viewer("raster lock poisoned".to_string()))?;
        (raster.width(), raster.height())
    };

    let mut view = Viewport::new(config.zoom);
    let win_width = width * view.zoom;
    let win_height = height * view.zoom;
    let mut frame = vec![BG; win_width * win_height];

    let mut window = Window::new(
        TITLE,
        win_width,
        win_height,
        WindowOptions {
            resize: false,
            ..WindowOptions::default()
        },
    )
    .map_err(|e| BinvizError::Viewer(e.to_string()))?;
    window.set_target_fps(config.fps);

    info!("Viewer open: {}x{} dots at {}x zoom", width, height, view.zoom);

    let mut paused = false;
    let mut last_revision = None;
    let mut dots = Vec::new();

    while window.is_open() {
        let mut needs_blit = false;

        if let Some((_, dy)) = window.get_scroll_wheel()
            && dy != 0.0
        {
            view.zoom_by(if dy > 0.0 { 1 } else { -1 });
            needs_blit = true;
        }
        if window.is_key_pressed(Key::Equal, KeyRepeat::Yes) || window.is_key_pressed(Key::NumPadPlus, KeyRepeat::Yes) {
            view.zoom_by(1);
            needs_blit = true;
        }
        if window.is_key_pressed(Key::Minus, KeyRepeat::Yes) || window.is_key_pressed(Key::NumPadMinus, KeyRepeat::Yes) {
            view.zoom_by(-1);
            needs_blit = true;
        }

        let shift = window.is_key_down(Key::LeftShift) || window.is_key_down(Key::RightShift);
        let step = if shift { 1 } else { 10 };
        if window.is_key_pressed(Key::Right, KeyRepeat::Yes) {
            view.scroll_x = (view.scroll_x + step).min(width.saturating_sub(1));
            needs_blit = true;
        }
        if window.is_key_pressed(Key::Left, KeyRepeat::Yes) {
            view.scroll_x = view.scroll_x.saturating_sub(step);
            needs_blit = true;
        }
        if window.is_key_pressed(Key::Down, KeyRepeat::Yes) {
            view.scroll_y = (view.scroll_y + step).min(height.saturating_sub(1));
            needs_blit = true;
        }
        if window.is_key_pressed(Key::Up, KeyRepeat::Yes) {
            view.scroll_y = view.scroll_y.saturating_sub(step);
            needs_blit = true;
        }
        if window.is_key_pressed(Key::Home, KeyRepeat::No) {
            view.scroll_x = 0;
            view.scroll_y = 0;
            needs_blit = true;
        }

        if window.get_mouse_down(MouseButton::Left) && !paused {
            debug!("Viewer paused");
            paused = true;
        }
        if paused && window.is_key_pressed(Key::Escape, KeyRepeat::No) {
            debug!("Viewer resumed");
            paused = false;
            last_revision = None;
        }

        if paused {
            let readout = window
                .get_mouse_pos(MouseMode::Discard)
                .and_then(|(mx, my)| view.dot_at(mx as usize, my as usize, width, height))
                .map(|(x, y)| format!(" x={} y={}", x, y))
                .unwrap_or_default();
            window.set_title(&format!("{}{}", PAUSED_TITLE, readout));
        } else {
            window.set_title(TITLE);
            // Copy out under the lock, render without it
            if let Ok(raster) = raster.lock()
                && last_revision != Some(raster.revision())
            {
                last_revision = Some(raster.revision());
                dots.clear();
                dots.extend_from_slice(raster.dots());
                needs_blit = true;
            }
        }

        if needs_blit && !dots.is_empty() {
            view.blit(&dots, width, height, &mut frame, win_width);
        }

        window
            .update_with_buffer(&frame, win_width, win_height)
            .map_err(|e| BinvizError::Viewer(e.to_string()))?;
    }

    info!("Viewer closed");
    Ok(())
}

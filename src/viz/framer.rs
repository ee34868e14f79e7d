//! Line framing of a bit stream
//!
//! The [`Framer`] turns bytes into a sequence of dots and line breaks on a
//! [`Canvas`]. Which bits are shown, and where lines break, depends on the
//! configured start, end and drop patterns:
//!
//! | start | end | behaviour                                                      |
//! |-------|-----|----------------------------------------------------------------|
//! | -     | -   | strip drops, show everything                                   |
//! | -     | yes | strip drops, break the line after each end pattern             |
//! | yes   | -   | strip drops, break the line before each start pattern          |
//! | yes   | yes | show only start..=end packets, one per line; drops are ignored |

use tracing::trace;

use super::bits::{BitPattern, BitQueue};

/// Anything the framer can draw onto
pub trait Canvas {
    fn put_bit(&mut self, bit: bool);
    fn new_line(&mut self);
}

/// Recorded framer output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stroke {
    Bit(bool),
    NewLine,
}

impl Canvas for Vec<Stroke> {
    fn put_bit(&mut self, bit: bool) {
        self.push(Stroke::Bit(bit));
    }

    fn new_line(&mut self) {
        self.push(Stroke::NewLine);
    }
}

/// Which combination of patterns is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    Free,
    EndOnly,
    StartOnly,
    Packet,
}

pub struct Framer {
    queue: BitQueue,
    start: Option<BitPattern>,
    end: Option<BitPattern>,
    drop: Option<BitPattern>,
    in_packet: bool,
}

impl Framer {
    pub fn new(start: Option<BitPattern>, end: Option<BitPattern>, drop: Option<BitPattern>) -> Self {
        Self {
            queue: BitQueue::new(),
            start,
            end,
            drop,
            in_packet: false,
        }
    }

    pub fn mode(&self) -> FrameMode {
        match (&self.start, &self.end) {
            (None, None) => FrameMode::Free,
            (None, Some(_)) => FrameMode::EndOnly,
            (Some(_), None) => FrameMode::StartOnly,
            (Some(_), Some(_)) => FrameMode::Packet,
        }
    }

    /// Between a start and its end pattern
    pub fn in_packet(&self) -> bool {
        self.in_packet
    }

    /// Bits held back for pattern matching
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Feed one byte and draw whatever it settles
    pub fn consume<C: Canvas + ?Sized>(&mut self, byte: u8, canvas: &mut C) {
        let Self {
            queue,
            start,
            end,
            drop,
            in_packet,
        } = self;
        queue.push_byte(byte);

        match (start.as_ref(), end.as_ref()) {
            (None, None) => {
                strip_drops(queue, drop.as_ref());
                let n = queue.len();
                show(queue, n, canvas);
            }
            (None, Some(end)) => {
                strip_drops(queue, drop.as_ref());
                let mut from = queue.fresh_start(end.len());
                while let Some(at) = queue.find(end, from) {
                    trace!("end pattern at bit {}", at);
                    show(queue, at + end.len(), canvas);
                    canvas.new_line();
                    from = 0;
                }
                show_all_but(queue, end.len() - 1, canvas);
            }
            (Some(start), None) => {
                strip_drops(queue, drop.as_ref());
                let mut from = queue.fresh_start(start.len());
                while let Some(at) = queue.find(start, from) {
                    trace!("start pattern at bit {}", at);
                    show(queue, at, canvas);
                    canvas.new_line();
                    show(queue, start.len(), canvas);
                    from = 0;
                }
                show_all_but(queue, start.len() - 1, canvas);
            }
            (Some(start), Some(end)) => {
                let mut from = queue.fresh_start(if *in_packet { end.len() } else { start.len() });
                loop {
                    if *in_packet {
                        let Some(at) = queue.find(end, from) else {
                            show_all_but(queue, end.len() - 1, canvas);
                            break;
                        };
                        trace!("packet end at bit {}", at);
                        show(queue, at + end.len(), canvas);
                        canvas.new_line();
                        *in_packet = false;
                    } else {
                        let Some(at) = queue.find(start, from) else {
                            let stale = queue.len().saturating_sub(start.len() - 1);
                            queue.discard_front(stale);
                            break;
                        };
                        trace!("packet start at bit {}", at);
                        queue.discard_front(at);
                        show(queue, start.len(), canvas);
                        *in_packet = true;
                    }
                    from = 0;
                }
            }
        }
    }

    /// Draw every bit still queued
    pub fn flush<C: Canvas + ?Sized>(&mut self, canvas: &mut C) {
        let n = self.queue.len();
        show(&mut self.queue, n, canvas);
    }
}

fn strip_drops(queue: &mut BitQueue, drop: Option<&BitPattern>) {
    if let Some(drop) = drop {
        let removed = queue.strip(drop);
        if removed > 0 {
            trace!("dropped {} occurrences of {}", removed, drop);
        }
    }
}

fn show<C: Canvas + ?Sized>(queue: &mut BitQueue, n: usize, canvas: &mut C) {
    for bit in queue.drain_front(n) {
        canvas.put_bit(bit);
    }
}

fn show_all_but<C: Canvas + ?Sized>(queue: &mut BitQueue, keep: usize, canvas: &mut C) {
    let n = queue.len().saturating_sub(keep);
    show(queue, n, canvas);
}

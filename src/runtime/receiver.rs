//! Channel receiver with a putback buffer and watchdog monitoring
//!
//! [`Receiver`] wraps one `crossbeam_channel::Receiver<ChannelMessage<T>>`.
//! It unwraps items transparently and latches end-of-stream in the owning
//! [`InputPort`](super::ports::InputPort), so every later call returns
//! `WorkError::Shutdown`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver as CrossbeamReceiver, RecvTimeoutError, TryRecvError};
use tracing::debug;

use super::errors::{WorkError, WorkResult};
use super::sender::ChannelMessage;
use super::watchdog::{OperationGuard, WatchdogHandle};

/// Typed view over an input port for the duration of one `work()` call.
///
/// The putback buffer is owned by the node so it persists across calls.
pub struct Receiver<'a, T> {
    receiver: &'a CrossbeamReceiver<ChannelMessage<T>>,
    buffer: &'a mut VecDeque<T>,
    watchdog_handle: Option<WatchdogHandle>,
    eos: &'a AtomicBool,
}

impl<'a, T> Receiver<'a, T> {
    pub fn new(
        receiver: &'a CrossbeamReceiver<ChannelMessage<T>>,
        buffer: &'a mut VecDeque<T>,
        watchdog_handle: Option<WatchdogHandle>,
        eos: &'a AtomicBool,
    ) -> Self {
        Self {
            receiver,
            buffer,
            watchdog_handle,
            eos,
        }
    }

    /// Whether end-of-stream has been seen on this port
    pub fn is_finished(&self) -> bool {
        self.eos.load(Ordering::Relaxed)
    }

    fn mark_finished(&self, why: &str) {
        self.eos.store(true, Ordering::Relaxed);
        debug!("Receiver: {}, returning Shutdown", why);
    }

    /// Blocking receive. Buffered items come first.
    pub fn recv(&mut self) -> WorkResult<T> {
        if let Some(item) = self.buffer.pop_front() {
            return Ok(item);
        }
        if self.is_finished() {
            return Err(WorkError::Shutdown);
        }

        let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);
        match self.receiver.recv() {
            Ok(ChannelMessage::Item(item)) => Ok(item),
            Ok(ChannelMessage::EndOfStream) => {
                self.mark_finished("end of stream");
                Err(WorkError::Shutdown)
            }
            Err(_) => {
                self.mark_finished("channel disconnected");
                Err(WorkError::Shutdown)
            }
        }
    }

    /// Peek at the next item, blocking to fetch one if the buffer is empty.
    pub fn peek(&mut self) -> WorkResult<&T> {
        if self.buffer.is_empty() {
            let item = self.recv()?;
            self.buffer.push_back(item);
        }
        self.buffer.front().ok_or(WorkError::Shutdown)
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        if let Some(item) = self.buffer.pop_front() {
            return Ok(item);
        }
        if self.is_finished() {
            return Err(TryRecvError::Disconnected);
        }

        match self.receiver.try_recv() {
            Ok(ChannelMessage::Item(item)) => Ok(item),
            Ok(ChannelMessage::EndOfStream) => {
                self.mark_finished("end of stream");
                Err(TryRecvError::Disconnected)
            }
            Err(TryRecvError::Disconnected) => {
                self.mark_finished("channel disconnected");
                Err(TryRecvError::Disconnected)
            }
            Err(e) => Err(e),
        }
    }

    /// Receive with a timeout.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        if let Some(item) = self.buffer.pop_front() {
            return Ok(item);
        }
        if self.is_finished() {
            return Err(RecvTimeoutError::Disconnected);
        }

        let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);
        match self.receiver.recv_timeout(timeout) {
            Ok(ChannelMessage::Item(item)) => Ok(item),
            Ok(ChannelMessage::EndOfStream) => {
                self.mark_finished("end of stream");
                Err(RecvTimeoutError::Disconnected)
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.mark_finished("channel disconnected");
                Err(RecvTimeoutError::Disconnected)
            }
            Err(e) => Err(e),
        }
    }

    /// Block for one item, then take whatever else is ready, up to `max` in total.
    ///
    /// Returns `Shutdown` only when no item at all could be received; an
    /// end-of-stream hit mid-batch is reported on the next call.
    pub fn recv_batch(&mut self, max: usize, out: &mut Vec<T>) -> WorkResult<usize> {
        let first = self.recv()?;
        out.push(first);
        let mut taken = 1;
        while taken < max {
            match self.try_recv() {
                Ok(item) => {
                    out.push(item);
                    taken += 1;
                }
                Err(_) => break,
            }
        }
        Ok(taken)
    }

    /// Push an item back so the next `recv()` returns it.
    pub fn put_back(&mut self, item: T) {
        self.buffer.push_front(item);
    }

    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Watchdog;
    use crossbeam_channel::bounded;

    #[test]
    fn test_recv_from_buffer_then_channel() {
        let (tx, rx) = bounded::<ChannelMessage<u8>>(10);
        let mut buf = VecDeque::new();
        buf.push_back(0xAA);

        let wd = Watchdog::new();
        let eos = AtomicBool::new(false);
        let mut pr = Receiver::new(&rx, &mut buf, Some(wd.register_port("test", "recv", "in")), &eos);

        assert_eq!(pr.recv().unwrap(), 0xAA);
        tx.send(ChannelMessage::Item(0x55)).unwrap();
        assert_eq!(pr.recv().unwrap(), 0x55);
    }

    #[test]
    fn test_put_back_and_peek() {
        let (_tx, rx) = bounded::<ChannelMessage<u8>>(10);
        let mut buf = VecDeque::new();
        let eos = AtomicBool::new(false);
        let mut pr = Receiver::new(&rx, &mut buf, None, &eos);

        assert!(!pr.has_buffered());
        pr.put_back(77);
        assert_eq!(pr.peek().unwrap(), &77);
        assert!(pr.has_buffered());
        assert_eq!(pr.recv().unwrap(), 77);
        assert!(!pr.has_buffered());
    }

    #[test]
    fn test_eos_is_latched() {
        let (tx, rx) = bounded::<ChannelMessage<u8>>(10);
        let mut buf = VecDeque::new();
        let eos = AtomicBool::new(false);

        tx.send(ChannelMessage::Item(42)).unwrap();
        tx.send(ChannelMessage::EndOfStream).unwrap();

        {
            let mut pr = Receiver::new(&rx, &mut buf, None, &eos);
            assert_eq!(pr.recv().unwrap(), 42);
            assert!(matches!(pr.recv(), Err(WorkError::Shutdown)));
        }

        // A later work() call builds a new receiver over the same port state
        tx.send(ChannelMessage::Item(43)).unwrap();
        let mut pr = Receiver::new(&rx, &mut buf, None, &eos);
        assert!(pr.is_finished());
        assert!(matches!(pr.recv(), Err(WorkError::Shutdown)));
        assert!(matches!(pr.peek(), Err(WorkError::Shutdown)));
        assert!(matches!(pr.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn test_disconnect_returns_shutdown() {
        let (tx, rx) = bounded::<ChannelMessage<u8>>(10);
        drop(tx);
        let mut buf = VecDeque::new();
        let eos = AtomicBool::new(false);
        let mut pr = Receiver::new(&rx, &mut buf, None, &eos);

        assert!(matches!(pr.recv(), Err(WorkError::Shutdown)));
        assert!(pr.is_finished());
    }

    #[test]
    fn test_recv_batch_stops_at_end_of_stream() {
        let (tx, rx) = bounded::<ChannelMessage<u8>>(10);
        for b in [1u8, 2, 3] {
            tx.send(ChannelMessage::Item(b)).unwrap();
        }
        tx.send(ChannelMessage::EndOfStream).unwrap();

        let mut buf = VecDeque::new();
        let eos = AtomicBool::new(false);
        let mut pr = Receiver::new(&rx, &mut buf, None, &eos);

        let mut out = Vec::new();
        assert_eq!(pr.recv_batch(16, &mut out).unwrap(), 3);
        assert_eq!(out, vec![1, 2, 3]);
        assert!(matches!(pr.recv_batch(16, &mut out), Err(WorkError::Shutdown)));
    }

    #[test]
    fn test_recv_batch_respects_max() {
        let (tx, rx) = bounded::<ChannelMessage<u8>>(10);
        for b in 0..5u8 {
            tx.send(ChannelMessage::Item(b)).unwrap();
        }
        let mut buf = VecDeque::new();
        let eos = AtomicBool::new(false);
        let mut pr = Receiver::new(&rx, &mut buf, None, &eos);

        let mut out = Vec::new();
        assert_eq!(pr.recv_batch(2, &mut out).unwrap(), 2);
        assert_eq!(out, vec![0, 1]);
    }
}

//! Broadcast sender with watchdog monitoring

use crossbeam_channel::{SendError, Sender as CrossbeamSender};

use super::watchdog::{OperationGuard, WatchdogHandle};

/// Message carried on every flowgraph channel
///
/// Sources finish with `EndOfStream` so that downstream nodes drain and stop
/// even while cloned channel handles are still alive. Nodes never see this
/// enum: [`Sender::send`] wraps and `Receiver::recv` unwraps.
#[derive(Clone, Debug)]
pub enum ChannelMessage<T> {
    Item(T),
    EndOfStream,
}

/// Sender that delivers every item to one or more consumers
///
/// Items are cloned per destination and sent from the caller's thread, in
/// destination order. A blocked destination holds up the others; use
/// [`Sender::split_senders`] to feed each destination from its own thread.
pub struct Sender<T> {
    destinations: Vec<CrossbeamSender<ChannelMessage<T>>>,
    watchdog_handle: Option<WatchdogHandle>,
}

impl<T: Clone> Sender<T> {
    pub fn new(destinations: Vec<CrossbeamSender<ChannelMessage<T>>>) -> Self {
        Self {
            destinations,
            watchdog_handle: None,
        }
    }

    /// Copy of this sender whose blocking sends are tracked by the watchdog
    pub fn with_watchdog(&self, watchdog_handle: WatchdogHandle) -> Self {
        Self {
            destinations: self.destinations.clone(),
            watchdog_handle: Some(watchdog_handle),
        }
    }

    /// One sender per destination
    pub fn split_senders(&self) -> Vec<Sender<T>> {
        self.destinations
            .iter()
            .map(|dest| Sender {
                destinations: vec![dest.clone()],
                watchdog_handle: self.watchdog_handle.clone(),
            })
            .collect()
    }

    pub fn num_destinations(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_connected(&self) -> bool {
        !self.destinations.is_empty()
    }

    /// Send a value to all destinations.
    ///
    /// Fails only when every destination has disconnected; a single live
    /// consumer keeps the stream going.
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        if self.destinations.is_empty() {
            return Ok(());
        }

        let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);

        let mut delivered = false;
        let mut rejected = None;
        for dest in &self.destinations {
            match dest.send(ChannelMessage::Item(value.clone())) {
                Ok(()) => delivered = true,
                Err(SendError(ChannelMessage::Item(v))) => rejected = Some(v),
                Err(SendError(ChannelMessage::EndOfStream)) => {}
            }
        }

        match rejected {
            Some(v) if !delivered => Err(SendError(v)),
            _ => Ok(()),
        }
    }

    /// Send every value of `items` in order, stopping at the first failure
    pub fn send_all(&self, items: impl IntoIterator<Item = T>) -> Result<usize, SendError<T>> {
        let mut sent = 0;
        for item in items {
            self.send(item)?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Signal end-of-stream to all destinations.
    ///
    /// Downstream receivers return `WorkError::Shutdown` once they reach the marker.
    pub fn close(&self) {
        let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);
        for dest in &self.destinations {
            let _ = dest.send(ChannelMessage::EndOfStream);
        }
    }
}

impl<T: Clone> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            destinations: self.destinations.clone(),
            watchdog_handle: self.watchdog_handle.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn item(msg: ChannelMessage<u8>) -> Option<u8> {
        match msg {
            ChannelMessage::Item(v) => Some(v),
            ChannelMessage::EndOfStream => None,
        }
    }

    #[test]
    fn test_broadcast_reaches_every_destination() {
        let (tx1, rx1) = bounded(4);
        let (tx2, rx2) = bounded(4);
        let sender = Sender::new(vec![tx1, tx2]);

        sender.send(0x55u8).unwrap();
        sender.close();

        assert_eq!(item(rx1.recv().unwrap()), Some(0x55));
        assert_eq!(item(rx2.recv().unwrap()), Some(0x55));
        assert_eq!(item(rx1.recv().unwrap()), None);
        assert_eq!(item(rx2.recv().unwrap()), None);
    }

    #[test]
    fn test_send_survives_one_dropped_destination() {
        let (tx1, rx1) = bounded(4);
        let (tx2, rx2) = bounded::<ChannelMessage<u8>>(4);
        drop(rx2);
        let sender = Sender::new(vec![tx1, tx2]);

        assert!(sender.send(7).is_ok());
        assert_eq!(item(rx1.recv().unwrap()), Some(7));
    }

    #[test]
    fn test_send_fails_when_all_destinations_dropped() {
        let (tx, rx) = bounded::<ChannelMessage<u8>>(4);
        drop(rx);
        let sender = Sender::new(vec![tx]);

        let err = sender.send(9).unwrap_err();
        assert_eq!(err.0, 9);
    }

    #[test]
    fn test_split_senders_one_per_destination() {
        let (tx1, rx1) = bounded(4);
        let (tx2, rx2) = bounded(4);
        let sender = Sender::new(vec![tx1, tx2]);

        let splits = sender.split_senders();
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].num_destinations(), 1);

        splits[1].send(3u8).unwrap();
        assert!(rx1.try_recv().is_err());
        assert_eq!(item(rx2.recv().unwrap()), Some(3));
    }

    #[test]
    fn test_unconnected_sender_discards() {
        let sender: Sender<u8> = Sender::new(Vec::new());
        assert!(!sender.is_connected());
        assert_eq!(sender.send_all([1, 2, 3]).unwrap(), 3);
    }
}

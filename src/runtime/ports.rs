//! Port schemas and type-erased channel endpoints
//!
//! Nodes describe their ports with [`PortSchema`]. At build time the pipeline
//! wraps each channel end in an [`InputPort`] or [`OutputPort`]; nodes recover
//! the typed endpoint with `get::<T>()`.

use std::any::{Any, TypeId};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::AtomicBool;

use crossbeam_channel::Receiver as CrossbeamReceiver;

use super::receiver::Receiver;
use super::sender::{ChannelMessage, Sender};
use super::watchdog::{Watchdog, WatchdogHandle};

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// Schema describing a port's metadata
#[derive(Debug, Clone)]
pub struct PortSchema {
    pub name: String,
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub index: usize,
    pub direction: PortDirection,
}

impl PortSchema {
    /// Create a new port schema carrying items of type `T`
    pub fn new<T: 'static>(name: impl Into<String>, index: usize, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            index,
            direction,
        }
    }

    pub fn input<T: 'static>(name: impl Into<String>, index: usize) -> Self {
        Self::new::<T>(name, index, PortDirection::Input)
    }

    pub fn output<T: 'static>(name: impl Into<String>, index: usize) -> Self {
        Self::new::<T>(name, index, PortDirection::Output)
    }
}

/// Type-erased input port wrapping a crossbeam receiver of `ChannelMessage<T>`
///
/// End-of-stream is latched here, so it survives across `work()` calls even
/// though each call builds a fresh [`Receiver`].
pub struct InputPort {
    channel: Box<dyn Any + Send>,
    watchdog_handle: Option<WatchdogHandle>,
    eos: AtomicBool,
}

impl InputPort {
    pub(crate) fn from_type_erased(channel: Box<dyn Any + Send>) -> Self {
        Self {
            channel,
            watchdog_handle: None,
            eos: AtomicBool::new(false),
        }
    }

    /// Port for an unconnected input; `get()` always returns None.
    pub(crate) fn unconnected() -> Self {
        Self::from_type_erased(Box::new(()))
    }

    /// Create a port around a raw channel end, registered with `watchdog`.
    /// Used to drive nodes without a pipeline (tests, custom hosts).
    pub fn new_with_watchdog<T: Send + 'static>(
        receiver: CrossbeamReceiver<ChannelMessage<T>>,
        watchdog: &Watchdog,
        node_name: &str,
        port_name: &str,
    ) -> Self {
        Self {
            channel: Box::new(receiver),
            watchdog_handle: Some(watchdog.register_port(node_name, "recv", port_name)),
            eos: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_watchdog(mut self, watchdog: &Watchdog, node_name: &str, port_name: &str) -> Self {
        self.watchdog_handle = Some(watchdog.register_port(node_name, "recv", port_name));
        self
    }

    /// Whether this port is wired to an upstream node
    pub fn is_connected(&self) -> bool {
        !self.channel.is::<()>()
    }

    /// Get a typed receiver over this port.
    ///
    /// `buffer` is the node-owned putback buffer. Returns None if the port is
    /// unconnected or carries a different item type.
    pub fn get<'a, T: Send + 'static>(&'a self, buffer: &'a mut VecDeque<T>) -> Option<Receiver<'a, T>> {
        let receiver = self.channel.downcast_ref::<CrossbeamReceiver<ChannelMessage<T>>>()?;
        Some(Receiver::new(receiver, buffer, self.watchdog_handle.clone(), &self.eos))
    }
}

/// Type-erased output port wrapping a broadcast [`Sender<T>`]
pub struct OutputPort {
    channel: Box<dyn Any + Send>,
    watchdog_handle: Option<WatchdogHandle>,
}

impl OutputPort {
    pub(crate) fn from_type_erased(channel: Box<dyn Any + Send>) -> Self {
        Self {
            channel,
            watchdog_handle: None,
        }
    }

    /// Port for an unconnected output; `get()` always returns None.
    pub(crate) fn unconnected() -> Self {
        Self::from_type_erased(Box::new(()))
    }

    /// Create a port around a broadcast sender, registered with `watchdog`.
    pub fn new_with_watchdog<T: Send + Clone + 'static>(
        sender: Sender<T>,
        watchdog: &Watchdog,
        node_name: &str,
        port_name: &str,
    ) -> Self {
        Self {
            channel: Box::new(sender),
            watchdog_handle: Some(watchdog.register_port(node_name, "send", port_name)),
        }
    }

    pub(crate) fn with_watchdog(mut self, watchdog: &Watchdog, node_name: &str, port_name: &str) -> Self {
        self.watchdog_handle = Some(watchdog.register_port(node_name, "send", port_name));
        self
    }

    pub fn is_connected(&self) -> bool {
        !self.channel.is::<()>()
    }

    /// Get a sender with watchdog monitoring attached.
    ///
    /// Returns None if the port is unconnected or carries a different item type.
    pub fn get<T: Send + Clone + 'static>(&self) -> Option<Sender<T>> {
        let sender = self.channel.downcast_ref::<Sender<T>>()?;
        Some(match &self.watchdog_handle {
            Some(handle) => sender.with_watchdog(handle.clone()),
            None => sender.clone(),
        })
    }

    /// Split the broadcast sender into one sender per destination, for nodes
    /// that feed each destination from its own thread.
    pub fn split_senders<T: Send + Clone + 'static>(&self) -> Option<Vec<Sender<T>>> {
        let splits = self.get::<T>()?.split_senders();
        if splits.is_empty() { None } else { Some(splits) }
    }
}

impl fmt::Debug for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InputPort(connected={})", self.is_connected())
    }
}

impl fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "OutputPort(connected={})", self.is_connected())
    }
}

//! Thread-per-node scheduler for streaming graphs
//!
//! Spawns a dedicated thread for each node and manages their lifecycle.
//!
//! ## Threading Models
//!
//! 1. **Regular nodes**: the scheduler calls `work()` in a loop. The node
//!    handles one batch per call and returns the item count.
//!
//! 2. **Self-threading nodes**: the node runs its own worker threads. The
//!    scheduler calls `work()` once, then polls `should_stop()` until the node
//!    reports completion or the scheduler is stopped.
//!
//! A node ends normally when `work()` returns `WorkError::Shutdown`, which is
//! what receivers return once end-of-stream has been seen.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver as StdReceiver, Sender as StdSender, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::errors::WorkError;
use super::node::ProcessNode;
use super::ports::{InputPort, OutputPort};
use super::watchdog::{DEFAULT_BLOCKED_THRESHOLD, Watchdog};

const SELF_THREADING_POLL: Duration = Duration::from_millis(100);

/// How a node thread ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// End of stream or `should_stop()`
    Finished,
    /// Scheduler stop signal
    Stopped,
    /// `work()` returned an error other than `Shutdown`, or the thread panicked
    Failed(String),
}

/// Per-node summary produced when a node thread ends
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub name: String,
    pub items: usize,
    pub outcome: NodeOutcome,
}

/// Summary of a whole run, in completion order
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub nodes: Vec<NodeReport>,
}

impl RunReport {
    /// True when no node failed
    pub fn is_success(&self) -> bool {
        self.nodes.iter().all(|n| !matches!(n.outcome, NodeOutcome::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|n| matches!(n.outcome, NodeOutcome::Failed(_)))
    }

    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

/// Runtime scheduler that executes a streaming graph
pub struct Scheduler {
    threads: Vec<(String, JoinHandle<NodeReport>)>,
    stop_signal: Arc<AtomicBool>,
    running: Arc<AtomicUsize>,
    completion_tx: Option<StdSender<String>>,
    completion_rx: StdReceiver<String>,
    watchdog: Watchdog,
    watchdog_thread: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Create a new scheduler with watchdog monitoring
    pub fn new() -> Self {
        Self::with_watchdog_threshold(DEFAULT_BLOCKED_THRESHOLD)
    }

    pub fn with_watchdog_threshold(threshold: Duration) -> Self {
        Self::with_watchdog(Watchdog::with_threshold(threshold))
    }

    /// Create a scheduler around an existing watchdog and start monitoring.
    /// The monitoring thread stops in `wait()` or when the scheduler is dropped.
    pub fn with_watchdog(watchdog: Watchdog) -> Self {
        let (completion_tx, completion_rx) = channel();
        let watchdog_thread = watchdog.start_monitoring_thread();
        info!(
            "Watchdog enabled, reporting operations blocked >{:.1}s",
            watchdog.threshold().as_secs_f64()
        );
        Self {
            threads: Vec::new(),
            stop_signal: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicUsize::new(0)),
            completion_tx: Some(completion_tx),
            completion_rx,
            watchdog,
            watchdog_thread: Some(watchdog_thread),
        }
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Start a process node in its own thread, reported under `node.name()`
    pub fn start_process(&mut self, node: Box<dyn ProcessNode>, inputs: Vec<InputPort>, outputs: Vec<OutputPort>) {
        let name = node.name().to_string();
        self.start_named_process(name, node, inputs, outputs);
    }

    /// Start a process node in its own thread, reported under `name`
    pub fn start_named_process(
        &mut self,
        name: impl Into<String>,
        mut node: Box<dyn ProcessNode>,
        inputs: Vec<InputPort>,
        outputs: Vec<OutputPort>,
    ) {
        let name = name.into();
        let Some(completion_tx) = self.completion_tx.clone() else {
            error!("[{}] Scheduler already waited on, node not started", name);
            return;
        };
        let stop_signal = Arc::clone(&self.stop_signal);
        let running = Arc::clone(&self.running);
        let report_name = name.clone();
        // Names need not be unique across nodes; the key must be
        let key = format!("{}#{}", name, self.threads.len());
        let thread_key = key.clone();

        debug!("Starting process node: {}", name);
        running.fetch_add(1, Ordering::SeqCst);

        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let mut report = if node.is_self_threading() {
                run_self_threading(node.as_mut(), &inputs, &outputs, &stop_signal)
            } else {
                run_regular(node.as_mut(), &inputs, &outputs, &stop_signal)
            };
            report.name = report_name;

            // Dropping the ports closes this node's channels before we report
            drop(outputs);
            drop(inputs);
            drop(node);

            running.fetch_sub(1, Ordering::SeqCst);
            let _ = completion_tx.send(thread_key);
            report
        });

        match spawned {
            Ok(handle) => self.threads.push((key, handle)),
            Err(e) => {
                self.running.fetch_sub(1, Ordering::SeqCst);
                error!("[{}] Failed to spawn node thread: {}", name, e);
            }
        }
    }

    /// Signal all nodes to stop
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::Relaxed);
    }

    /// Number of node threads that have not yet finished
    pub fn running_nodes(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// True once every node thread has finished
    pub fn is_finished(&self) -> bool {
        self.running_nodes() == 0
    }

    /// Wait for all node threads to complete and collect their reports
    pub fn wait(mut self) -> RunReport {
        let threads = std::mem::take(&mut self.threads);

        // The channel closes once every node thread has dropped its sender
        self.completion_tx = None;

        let total = threads.len();
        let mut completed = 0;
        let mut report = RunReport::default();
        let mut threads_by_key: HashMap<String, JoinHandle<NodeReport>> = threads.into_iter().collect();

        info!("Waiting for {} threads to complete...", total);

        while completed < total {
            let Ok(key) = self.completion_rx.recv() else {
                break;
            };
            completed += 1;
            if let Some(handle) = threads_by_key.remove(&key) {
                report.nodes.push(join_node(&key, handle, completed, total));
            }
        }

        // Threads that panicked never sent a completion
        for (key, handle) in threads_by_key {
            report.nodes.push(join_node(&key, handle, total, total));
        }

        info!("All {} threads completed", total);

        self.stop_watchdog();
        report
    }

    fn stop_watchdog(&mut self) {
        self.watchdog.stop();
        if let Some(handle) = self.watchdog_thread.take() {
            let _ = handle.join();
        }
    }

    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    pub fn thread_names(&self) -> Vec<String> {
        self.threads
            .iter()
            .map(|(key, _)| key.rsplit_once('#').map(|(name, _)| name).unwrap_or(key).to_string())
            .collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            debug!("Scheduler dropped with {} node threads, stopping them", self.threads.len());
            self.stop();
        }
        self.stop_watchdog();
    }
}

fn run_regular(
    node: &mut dyn ProcessNode,
    inputs: &[InputPort],
    outputs: &[OutputPort],
    stop_signal: &AtomicBool,
) -> NodeReport {
    let name = node.name().to_string();
    let mut items = 0usize;

    let outcome = loop {
        if stop_signal.load(Ordering::Relaxed) {
            break NodeOutcome::Stopped;
        }
        if node.should_stop() {
            break NodeOutcome::Finished;
        }

        match node.work(inputs, outputs) {
            Ok(n) => items += n,
            Err(WorkError::Shutdown) => break NodeOutcome::Finished,
            Err(e) => {
                error!("[{}] Work error: {}", name, e);
                break NodeOutcome::Failed(e.to_string());
            }
        }
    };

    info!("[{}] Shutdown. Processed {} items.", name, items);
    NodeReport { name, items, outcome }
}

fn run_self_threading(
    node: &mut dyn ProcessNode,
    inputs: &[InputPort],
    outputs: &[OutputPort],
    stop_signal: &AtomicBool,
) -> NodeReport {
    let name = node.name().to_string();

    let items = match node.work(inputs, outputs) {
        Ok(n) => n,
        Err(e) => {
            error!("[{}] Failed to start self-threading node: {}", name, e);
            return NodeReport {
                name,
                items: 0,
                outcome: NodeOutcome::Failed(e.to_string()),
            };
        }
    };

    let outcome = loop {
        if stop_signal.load(Ordering::Relaxed) {
            info!("[{}] Stop signal received, shutting down self-threading node", name);
            break NodeOutcome::Stopped;
        }
        if node.should_stop() {
            info!("[{}] Self-threading node completed", name);
            break NodeOutcome::Finished;
        }
        thread::sleep(SELF_THREADING_POLL);
    };

    let items = node.items_processed().unwrap_or(items);
    NodeReport { name, items, outcome }
}

fn join_node(key: &str, handle: JoinHandle<NodeReport>, completed: usize, total: usize) -> NodeReport {
    match handle.join() {
        Ok(report) => {
            info!("[{}] Thread completed ({}/{})", report.name, completed, total);
            report
        }
        Err(_) => {
            let name = key.rsplit_once('#').map(|(name, _)| name).unwrap_or(key).to_string();
            warn!("[{}] Thread panicked ({}/{})", name, completed, total);
            NodeReport {
                name,
                items: 0,
                outcome: NodeOutcome::Failed("thread panicked".to_string()),
            }
        }
    }
}

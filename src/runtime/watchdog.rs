//! Channel operation watchdog
//!
//! Each sender/receiver records the start time of a blocking operation in an
//! atomic. A monitoring thread scans those timestamps and warns once per
//! operation that stays blocked longer than the threshold.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

pub const DEFAULT_BLOCKED_THRESHOLD: Duration = Duration::from_secs(5);

#[inline(always)]
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

struct PortState {
    /// ms since epoch when the current operation started, 0 if idle
    last_op_start: AtomicU64,
    has_warned: AtomicBool,
    node_name: String,
    port_name: String,
    operation: &'static str,
}

/// Per-port handle held by senders and receivers
#[derive(Clone)]
pub struct WatchdogHandle {
    state: Arc<PortState>,
}

impl WatchdogHandle {
    #[inline(always)]
    pub fn start_operation(&self) {
        self.state.last_op_start.store(now_millis(), Ordering::Relaxed);
        self.state.has_warned.store(false, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn finish_operation(&self) {
        if self.state.has_warned.swap(false, Ordering::Relaxed) {
            info!(
                "UNBLOCKED: [{}] {} on port '{}'",
                self.state.node_name, self.state.operation, self.state.port_name
            );
        }
        self.state.last_op_start.store(0, Ordering::Relaxed);
    }

    /// Whether an operation is in flight on this port
    pub fn is_busy(&self) -> bool {
        self.state.last_op_start.load(Ordering::Relaxed) != 0
    }
}

/// Shared registry of monitored ports
#[derive(Clone)]
pub struct Watchdog {
    ports: Arc<Mutex<Vec<Weak<PortState>>>>,
    running: Arc<AtomicBool>,
    monitoring: Arc<AtomicBool>,
    threshold: Duration,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_BLOCKED_THRESHOLD)
    }

    pub fn with_threshold(threshold: Duration) -> Self {
        Self {
            ports: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(true)),
            monitoring: Arc::new(AtomicBool::new(false)),
            threshold,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Register a port; `operation` is "send" or "recv"
    pub fn register_port(&self, node_name: &str, operation: &'static str, port_name: &str) -> WatchdogHandle {
        let state = Arc::new(PortState {
            last_op_start: AtomicU64::new(0),
            has_warned: AtomicBool::new(false),
            node_name: node_name.to_string(),
            port_name: port_name.to_string(),
            operation,
        });

        if let Ok(mut ports) = self.ports.lock() {
            ports.push(Arc::downgrade(&state));
        }

        WatchdogHandle { state }
    }

    /// Warn about operations blocked past the threshold. Returns how many
    /// ports are currently blocked.
    pub fn check_for_blocked(&self) -> usize {
        let now = now_millis();
        let threshold_ms = self.threshold.as_millis() as u64;
        let mut blocked = 0;

        let Ok(mut ports) = self.ports.lock() else {
            return 0;
        };

        // Dropped ports leave dead weak references behind
        ports.retain(|weak| {
            let Some(state) = weak.upgrade() else {
                return false;
            };
            let start = state.last_op_start.load(Ordering::Relaxed);
            if start > 0 {
                let duration_ms = now.saturating_sub(start);
                if duration_ms > threshold_ms {
                    blocked += 1;
                    if !state.has_warned.swap(true, Ordering::Relaxed) {
                        warn!(
                            "BLOCKED: [{}] {} on port '{}' for {:.1}s",
                            state.node_name,
                            state.operation,
                            state.port_name,
                            duration_ms as f64 / 1000.0
                        );
                    }
                }
            }
            true
        });

        blocked
    }

    /// Number of live registered ports
    pub fn num_ports(&self) -> usize {
        self.ports
            .lock()
            .map(|ports| ports.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    pub fn start_monitoring_thread(&self) -> JoinHandle<()> {
        let watchdog = self.clone();
        let poll = (self.threshold / 5).clamp(Duration::from_millis(10), Duration::from_secs(1));
        self.running.store(true, Ordering::Relaxed);
        self.monitoring.store(true, Ordering::Relaxed);
        std::thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || {
                while watchdog.running.load(Ordering::Relaxed) {
                    std::thread::sleep(poll);
                    watchdog.check_for_blocked();
                }
                watchdog.monitoring.store(false, Ordering::Relaxed);
            })
            .unwrap_or_else(|e| {
                warn!("Failed to spawn watchdog thread: {}", e);
                self.monitoring.store(false, Ordering::Relaxed);
                std::thread::spawn(|| {})
            })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Whether a monitoring thread is alive for this watchdog
    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Relaxed)
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard marking a blocking operation on a port
pub struct OperationGuard<'a> {
    handle: &'a WatchdogHandle,
}

impl<'a> OperationGuard<'a> {
    #[inline(always)]
    pub fn new(handle: &'a WatchdogHandle) -> Self {
        handle.start_operation();
        Self { handle }
    }
}

impl Drop for OperationGuard<'_> {
    #[inline(always)]
    fn drop(&mut self) {
        self.handle.finish_operation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_marks_operation() {
        let wd = Watchdog::new();
        let handle = wd.register_port("sink", "recv", "in");
        assert!(!handle.is_busy());
        {
            let _guard = OperationGuard::new(&handle);
            assert!(handle.is_busy());
        }
        assert!(!handle.is_busy());
    }

    #[test]
    fn test_blocked_operation_detected_past_threshold() {
        let wd = Watchdog::with_threshold(Duration::from_millis(20));
        let handle = wd.register_port("sink", "recv", "in");

        let _guard = OperationGuard::new(&handle);
        assert_eq!(wd.check_for_blocked(), 0);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(wd.check_for_blocked(), 1);
    }

    #[test]
    fn test_monitoring_thread_exits_on_stop() {
        let wd = Watchdog::with_threshold(Duration::from_millis(50));
        assert!(!wd.is_monitoring());
        let thread = wd.start_monitoring_thread();
        assert!(wd.is_monitoring());
        wd.stop();
        thread.join().unwrap();
        assert!(!wd.is_monitoring());
    }

    #[test]
    fn test_dropped_ports_are_forgotten() {
        let wd = Watchdog::new();
        let handle = wd.register_port("source", "send", "out");
        assert_eq!(wd.num_ports(), 1);
        drop(handle);
        wd.check_for_blocked();
        assert_eq!(wd.num_ports(), 0);
    }
}

//! Blocking-operation watchdog for spotting stalled blocks
//!
//! Every block registers one [`WatchdogHandle`]. Before a blocking ring or
//! barrier wait the block stores the current time and the operation kind in
//! atomics; a monitor thread periodically scans those timestamps and warns
//! once about any operation blocked for longer than the threshold. The
//! watchdog only reports, it never cancels anything.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Operations blocked for longer than this are reported
const BLOCKED_THRESHOLD_MS: u64 = 5000;

/// Timestamp in milliseconds since UNIX_EPOCH
#[inline(always)]
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Blocking operations a block can be waiting in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    RingRead = 0,
    RingWrite = 1,
    AwaitConsumers = 2,
    ReleaseFrame = 3,
    ConsumeFrame = 4,
    CloseFanout = 5,
}

impl Operation {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Operation::RingRead,
            1 => Operation::RingWrite,
            2 => Operation::AwaitConsumers,
            3 => Operation::ReleaseFrame,
            4 => Operation::ConsumeFrame,
            _ => Operation::CloseFanout,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::RingRead => "ring read",
            Operation::RingWrite => "ring write",
            Operation::AwaitConsumers => "await consumers",
            Operation::ReleaseFrame => "release frame",
            Operation::ConsumeFrame => "consume frame",
            Operation::CloseFanout => "close fan-out",
        }
    }
}

/// Per-block operation tracking
struct BlockState {
    /// Timestamp (ms since epoch) when the current operation started, or 0 if idle
    last_op_start: AtomicU64,
    operation: AtomicU8,
    /// Set once the current operation has been reported
    has_warned: AtomicBool,
    block_name: String,
}

/// Handle to a block's watchdog state
#[derive(Clone)]
pub struct WatchdogHandle {
    state: Arc<BlockState>,
}

impl WatchdogHandle {
    /// Mark the start of a blocking operation
    #[inline(always)]
    pub fn start_operation(&self, operation: Operation) {
        self.state.operation.store(operation as u8, Ordering::Relaxed);
        self.state.has_warned.store(false, Ordering::Relaxed);
        self.state.last_op_start.store(now_millis(), Ordering::Relaxed);
    }

    /// Mark the end of a blocking operation
    #[inline(always)]
    pub fn finish_operation(&self) {
        if self.state.has_warned.swap(false, Ordering::Relaxed) {
            info!(
                "UNBLOCKED: [{}] {}",
                self.state.block_name,
                Operation::from_u8(self.state.operation.load(Ordering::Relaxed)).as_str()
            );
        }
        self.state.last_op_start.store(0, Ordering::Relaxed);
    }

    pub fn block_name(&self) -> &str {
        &self.state.block_name
    }
}

/// Shared watchdog registry
#[derive(Clone)]
pub struct Watchdog {
    blocks: Arc<Mutex<Vec<Weak<BlockState>>>>,
    enabled: Arc<AtomicBool>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            blocks: Arc::new(Mutex::new(Vec::new())),
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Register a block for monitoring
    pub fn register_block(&self, block_name: &str) -> WatchdogHandle {
        let state = Arc::new(BlockState {
            last_op_start: AtomicU64::new(0),
            operation: AtomicU8::new(0),
            has_warned: AtomicBool::new(false),
            block_name: block_name.to_string(),
        });

        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&state));

        WatchdogHandle { state }
    }

    /// Report operations blocked longer than the threshold.
    ///
    /// Returns the number of newly reported operations.
    pub fn check_for_blocked(&self) -> usize {
        self.check_for_blocked_at(now_millis())
    }

    fn check_for_blocked_at(&self, now: u64) -> usize {
        let mut reported = 0;
        let mut blocks = self.blocks.lock().unwrap_or_else(PoisonError::into_inner);

        // Drop registrations of blocks that have gone away
        blocks.retain(|weak| {
            let Some(state) = weak.upgrade() else {
                return false;
            };
            let start = state.last_op_start.load(Ordering::Relaxed);
            if start > 0 {
                let duration_ms = now.saturating_sub(start);
                if duration_ms > BLOCKED_THRESHOLD_MS
                    && !state.has_warned.swap(true, Ordering::Relaxed)
                {
                    warn!(
                        "BLOCKED: [{}] {} for {:.1}s",
                        state.block_name,
                        Operation::from_u8(state.operation.load(Ordering::Relaxed)).as_str(),
                        duration_ms as f64 / 1000.0
                    );
                    reported += 1;
                }
            }
            true
        });

        reported
    }

    /// Start the monitoring thread; it exits after [`stop`](Self::stop).
    pub fn start_monitoring_thread(&self) -> JoinHandle<()> {
        let watchdog = self.clone();
        std::thread::spawn(move || {
            while watchdog.enabled.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(250));
                watchdog.check_for_blocked();
            }
        })
    }

    pub fn stop(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard tracking one blocking operation
pub struct OperationGuard<'a> {
    handle: &'a WatchdogHandle,
}

impl<'a> OperationGuard<'a> {
    #[inline(always)]
    pub fn new(handle: &'a WatchdogHandle, operation: Operation) -> Self {
        handle.start_operation(operation);
        Self { handle }
    }
}

impl Drop for OperationGuard<'_> {
    #[inline(always)]
    fn drop(&mut self) {
        self.handle.finish_operation();
    }
}

//! Thread-per-block scheduler
//!
//! Owns the started blocks of a [`Pipeline`](super::Pipeline) and manages
//! their lifecycle. Every block runs its worker on a dedicated thread and
//! reports on a completion channel when it exits, so [`Scheduler::wait`]
//! joins threads in the order they actually finish.
//!
//! ## Stopping
//!
//! [`Scheduler::stop`] only signals the *root* blocks: those fed from outside
//! the graph and those without an input. Everything downstream drains what
//! is already buffered and stops once its producer has shut its output down.

use super::block::Block;
use super::errors::ConnectionError;
use super::watchdog::Watchdog;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Runtime scheduler that executes a block graph
pub struct Scheduler {
    blocks: Vec<Block>,
    roots: Vec<usize>,
    completion_tx: Option<Sender<String>>,
    completion_rx: Receiver<String>,
    watchdog: Option<(Watchdog, JoinHandle<()>)>,
}

impl Scheduler {
    /// Create an empty scheduler, optionally with watchdog monitoring
    pub(crate) fn new(watchdog_enabled: bool) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        let watchdog = watchdog_enabled.then(|| {
            let watchdog = Watchdog::new();
            let handle = watchdog.start_monitoring_thread();
            info!("Watchdog enabled - will report operations blocked >5 seconds");
            (watchdog, handle)
        });
        Self {
            blocks: Vec::new(),
            roots: Vec::new(),
            completion_tx: Some(completion_tx),
            completion_rx,
            watchdog,
        }
    }

    /// The watchdog shared by all blocks, if enabled
    pub fn watchdog(&self) -> Option<&Watchdog> {
        self.watchdog.as_ref().map(|(watchdog, _)| watchdog)
    }

    /// Sender for block completion notices; `None` once [`wait`](Self::wait)
    /// has closed the channel.
    pub(crate) fn completion_sender(&self) -> Option<Sender<String>> {
        self.completion_tx.clone()
    }

    pub(crate) fn push(&mut self, block: Block, root: bool) {
        if root {
            self.roots.push(self.blocks.len());
        }
        self.blocks.push(block);
    }

    /// Look up a block by name
    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name() == name)
    }

    /// Request ordered shutdown of one block
    pub fn request_shutdown(&self, name: &str) -> Result<(), ConnectionError> {
        let block = self
            .block(name)
            .ok_or_else(|| ConnectionError::BlockNotFound(name.to_string()))?;
        block.request_shutdown();
        Ok(())
    }

    /// Signal every root block to stop
    pub fn stop(&self) {
        debug!("Stopping {} root block(s)", self.roots.len());
        for &id in &self.roots {
            self.blocks[id].request_shutdown();
        }
    }

    /// Wait for all block threads to complete.
    ///
    /// Uses the completion channel to join threads as they finish. Blocks
    /// stay inspectable afterwards.
    pub fn wait(&mut self) {
        // Drop our sender so the channel closes when all threads complete
        self.completion_tx = None;

        let total_threads = self.blocks.len();
        let mut completed = 0;

        info!("Waiting for {} threads to complete...", total_threads);

        while completed < total_threads {
            let Ok(thread_name) = self.completion_rx.recv() else {
                // Channel closed - all thread senders dropped
                break;
            };
            completed += 1;
            if let Some(block) = self.blocks.iter_mut().find(|b| b.name() == thread_name) {
                match block.join() {
                    Ok(()) => info!(
                        "[{}] Thread completed ({}/{})",
                        thread_name, completed, total_threads
                    ),
                    Err(e) => error!(
                        "[{}] Thread panicked ({}/{}): {:?}",
                        thread_name, completed, total_threads, e
                    ),
                }
            }
        }

        // Threads that panicked before reporting
        for block in &mut self.blocks {
            if let Err(e) = block.join() {
                error!("[{}] Thread panicked: {:?}", block.name(), e);
            }
        }

        info!("All {} threads completed", total_threads);

        if let Some((watchdog, handle)) = self.watchdog.take() {
            watchdog.stop();
            let _ = handle.join();
        }
    }

    /// Get the number of block threads
    pub fn num_threads(&self) -> usize {
        self.blocks.len()
    }

    /// Get the names of all block threads
    pub fn thread_names(&self) -> Vec<String> {
        self.blocks.iter().map(|b| b.name().to_string()).collect()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some((watchdog, _)) = &self.watchdog {
            watchdog.stop();
        }
    }
}

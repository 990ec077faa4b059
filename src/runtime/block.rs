//! Blocks: named processing stages running on their own thread
//!
//! A [`Block`] wraps a [`BlockWorker`] together with its wiring and lifecycle
//! state. The worker declares its producer and consumer roles (and their
//! transfer units) so the wiring layer can size buffers before any thread
//! starts. [`Block::start`] prepares the worker on the caller's thread, so
//! setup failures surface to the caller, then spawns the worker thread.
//!
//! However the worker exits, returning or panicking, the thread shuts its
//! output down and releases its fan-out input before it ends. A panic is
//! then re-raised so [`Block::join`] reports it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender as CompletionSender;
use tracing::{debug, error, info, warn};

use super::errors::{StartError, WorkResult};
use super::ports::{InputPort, OutputPort};
use super::ring::SampleRing;
use super::watchdog::{Operation, OperationGuard, Watchdog, WatchdogHandle};

/// How a producer hands data to its consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerKind {
    /// Writes into one consumer's ring
    Single,
    /// Shares each frame with every consumer through a fan-out buffer
    Multi,
}

/// Producer role of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Producer {
    pub kind: ProducerKind,
    /// Largest number of samples written per transfer (frame size for `Multi`)
    pub max_transfer_unit: usize,
}

/// Consumer role of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumer {
    /// Smallest number of samples read per transfer
    pub min_read_unit: usize,
}

/// The processing routine behind a block
pub trait BlockWorker: Send {
    /// Default name of blocks built from this worker
    fn name(&self) -> &str;

    /// Producer role, if this worker has an output
    fn producer(&self) -> Option<Producer> {
        None
    }

    /// Consumer role, if this worker has an input
    fn consumer(&self) -> Option<Consumer> {
        None
    }

    /// Called on the starting thread once wiring is complete, before the
    /// worker thread is spawned. Errors abort the start.
    fn prepare(&mut self, _io: &BlockIo) -> Result<(), StartError> {
        Ok(())
    }

    /// Thread routine. Returns the number of items produced or consumed.
    ///
    /// Returning (with or without error) or panicking ends the block; its
    /// output is shut down afterwards if the worker has not already done so.
    fn run(&mut self, io: &BlockIo) -> WorkResult<usize>;
}

/// Everything a running worker can touch
pub struct BlockIo {
    name: String,
    input: Option<InputPort>,
    output: Option<OutputPort>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    watchdog: Option<WatchdogHandle>,
    finished: AtomicBool,
}

impl BlockIo {
    /// Build an I/O context outside of [`Block::start`], e.g. to drive a
    /// worker on the current thread.
    pub fn new(
        name: impl Into<String>,
        input: Option<InputPort>,
        output: Option<OutputPort>,
    ) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            stop: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            watchdog: None,
            finished: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> Option<&InputPort> {
        self.input.as_ref()
    }

    pub fn output(&self) -> Option<&OutputPort> {
        self.output.as_ref()
    }

    /// True once [`Block::request_shutdown`] has been called.
    ///
    /// Blocks with an input ring see shutdown through the ring instead; this
    /// flag is for sources without one.
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Track a blocking operation with the watchdog, if one is attached
    pub fn watch(&self, operation: Operation) -> Option<OperationGuard<'_>> {
        self.watchdog
            .as_ref()
            .map(|handle| OperationGuard::new(handle, operation))
    }

    /// Terminal cleanup: propagate shutdown downstream and mark the block
    /// as not running. Runs once no matter how often it is called.
    pub fn finish(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(output) = &self.output {
            debug!(
                "[{}] Propagating shutdown to {} consumer(s)",
                self.name,
                output.num_consumers()
            );
            let _guard = self.watch(Operation::CloseFanout);
            output.shutdown();
        }
        self.running.store(false, Ordering::Release);
    }

    /// Leave the input fan-out, if any, without stalling its producer.
    ///
    /// A worker that returned before end of stream still holds a barrier
    /// slot; frames are discarded until the producer closes.
    fn release_input(&self) {
        let Some(reader) = self.input.as_ref().and_then(InputPort::fanout) else {
            return;
        };
        if reader.is_ended() {
            return;
        }
        let _guard = self.watch(Operation::ConsumeFrame);
        let discarded = reader.discard_remaining();
        if discarded > 0 {
            warn!("[{}] Discarded {} frame(s) after the worker exited", self.name, discarded);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// A named processing stage
pub struct Block {
    name: String,
    worker: Option<Box<dyn BlockWorker>>,
    producer: Option<Producer>,
    consumer: Option<Consumer>,
    input: Option<InputPort>,
    output: Option<OutputPort>,
    input_ring: Option<Arc<SampleRing>>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    watchdog: Option<Watchdog>,
    thread: Option<JoinHandle<()>>,
}

impl Block {
    /// Wrap a worker; the block takes the worker's name
    pub fn new(worker: impl BlockWorker + 'static) -> Self {
        let name = worker.name().to_string();
        let producer = worker.producer();
        let consumer = worker.consumer();
        Self {
            name,
            worker: Some(Box::new(worker)),
            producer,
            consumer,
            input: None,
            output: None,
            input_ring: None,
            stop: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            watchdog: None,
            thread: None,
        }
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn producer(&self) -> Option<Producer> {
        self.producer
    }

    pub fn consumer(&self) -> Option<Consumer> {
        self.consumer
    }

    pub fn max_transfer_unit(&self) -> Option<usize> {
        self.producer.map(|p| p.max_transfer_unit)
    }

    pub fn min_read_unit(&self) -> Option<usize> {
        self.consumer.map(|c| c.min_read_unit)
    }

    /// True while the worker thread has not finished
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// True once the block has been started (even if it has finished since)
    pub fn is_started(&self) -> bool {
        self.worker.is_none()
    }

    /// The block's input ring, once wired.
    ///
    /// Upstream writers outside the graph write here; consumers fed by a
    /// fan-out observe end of stream on it after their producer exits.
    pub fn input_ring(&self) -> Option<&Arc<SampleRing>> {
        self.input_ring.as_ref()
    }

    pub(crate) fn has_input(&self) -> bool {
        self.input_ring.is_some()
    }

    pub(crate) fn has_output(&self) -> bool {
        self.output.is_some()
    }

    pub(crate) fn set_input(&mut self, port: InputPort) {
        self.input_ring = Some(port.shared_ring());
        self.input = Some(port);
    }

    pub(crate) fn set_output(&mut self, port: OutputPort) {
        self.output = Some(port);
    }

    pub(crate) fn set_watchdog(&mut self, watchdog: Watchdog) {
        self.watchdog = Some(watchdog);
    }

    /// Prepare the worker and spawn its thread
    pub fn start(&mut self) -> Result<(), StartError> {
        let (worker, io) = self.prepare()?;
        self.launch(worker, io, None)
    }

    /// Validate wiring and run the worker's setup on the current thread
    pub(crate) fn prepare(&mut self) -> Result<(Box<dyn BlockWorker>, BlockIo), StartError> {
        if self.is_started() {
            return Err(StartError::AlreadyStarted(self.name.clone()));
        }
        if self.producer.is_some() && self.output.is_none() {
            return Err(StartError::NotWired {
                block: self.name.clone(),
                side: "output",
            });
        }
        if self.consumer.is_some() && self.input.is_none() {
            return Err(StartError::NotWired {
                block: self.name.clone(),
                side: "input",
            });
        }

        let mut worker = self
            .worker
            .take()
            .ok_or_else(|| StartError::AlreadyStarted(self.name.clone()))?;
        let io = BlockIo {
            name: self.name.clone(),
            input: self.input.take(),
            output: self.output.take(),
            stop: Arc::clone(&self.stop),
            running: Arc::clone(&self.running),
            watchdog: self
                .watchdog
                .as_ref()
                .map(|watchdog| watchdog.register_block(&self.name)),
            finished: AtomicBool::new(false),
        };

        if let Err(e) = worker.prepare(&io) {
            error!("[{}] Setup failed: {}", self.name, e);
            // Leave the block as it was so nothing half-started remains
            self.input = io.input;
            self.output = io.output;
            self.worker = Some(worker);
            return Err(e);
        }
        Ok((worker, io))
    }

    /// Spawn the worker thread for a prepared worker
    pub(crate) fn launch(
        &mut self,
        mut worker: Box<dyn BlockWorker>,
        io: BlockIo,
        completion: Option<CompletionSender<String>>,
    ) -> Result<(), StartError> {
        let name = self.name.clone();
        let thread_name = name.clone();

        self.running.store(true, Ordering::Release);
        debug!("Starting block: {}", name);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let panicked = match panic::catch_unwind(AssertUnwindSafe(|| worker.run(&io))) {
                    Ok(Ok(items)) => {
                        info!("[{}] Shutdown. Processed {} items.", thread_name, items);
                        None
                    }
                    Ok(Err(e)) => {
                        error!("[{}] Work error: {}", thread_name, e);
                        None
                    }
                    Err(payload) => {
                        error!(
                            "[{}] Worker panicked: {}",
                            thread_name,
                            panic_message(payload.as_ref())
                        );
                        Some(payload)
                    }
                };
                io.finish();
                io.release_input();
                drop(io);

                // Notify scheduler that this thread is about to complete
                if let Some(completion) = completion {
                    let _ = completion.send(thread_name);
                }
                if let Some(payload) = panicked {
                    panic::resume_unwind(payload);
                }
            })
            .map_err(|source| {
                self.running.store(false, Ordering::Release);
                StartError::Spawn {
                    block: name,
                    source,
                }
            })?;

        self.thread = Some(handle);
        Ok(())
    }

    /// Ask the block to stop once its buffered input is drained.
    ///
    /// Signals shutdown on the block's input ring and sets its stop flag.
    pub fn request_shutdown(&self) {
        info!("[{}] Shutdown requested", self.name);
        self.stop.store(true, Ordering::Release);
        if let Some(ring) = &self.input_ring {
            ring.signal_shutdown();
        }
    }

    /// Wait for the worker thread to exit. Returns immediately if the block
    /// was never started or has already been joined.
    pub fn join(&mut self) -> thread::Result<()> {
        match self.thread.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("name", &self.name)
            .field("producer", &self.producer)
            .field("consumer", &self.consumer)
            .field("started", &self.is_started())
            .field("running", &self.is_running())
            .finish()
    }
}

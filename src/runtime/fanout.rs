//! Lock-step frame sharing between one producer and N consumers
//!
//! A [`FanoutBuffer`] owns a single frame and two barriers of N+1 parties.
//! Every frame cycle runs the same two-phase protocol:
//!
//! 1. The producer writes the frame, then waits on `data_ready`.
//! 2. Each consumer passes `data_ready`, reads the frame, then waits on
//!    `consumers_ready`.
//! 3. The producer waits on `consumers_ready` before writing the next frame.
//!
//! Before the first frame the producer waits once on `consumers_ready`,
//! which doubles as "every consumer has finished initializing". The frame is
//! never copied and never written while a consumer may be reading it. There is
//! no double buffering, so each cycle runs at the pace of the slowest consumer.
//!
//! A consumer that stops early must keep answering both barriers until the
//! producer closes the buffer, see [`FanoutReader::discard_remaining`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, PoisonError, RwLock, RwLockWriteGuard};
use tracing::debug;

use super::errors::{WorkError, WorkResult};
use super::sample::{self, Sample};

/// Shared frame plus the `data_ready` / `consumers_ready` barriers
pub struct FanoutBuffer {
    frame: RwLock<Vec<Sample>>,
    consumers: usize,
    data_ready: Barrier,
    consumers_ready: Barrier,
    started: AtomicBool,
    closed: AtomicBool,
}

impl FanoutBuffer {
    /// Create a zeroed frame of `frame_len` samples shared by `consumers`
    /// readers.
    ///
    /// Returns the producer-side buffer and exactly one [`FanoutReader`] per
    /// consumer, so the barrier party count always matches the readers handed
    /// out.
    ///
    /// # Panics
    /// Panics if `frame_len` or `consumers` is 0.
    pub fn new(frame_len: usize, consumers: usize) -> (Arc<Self>, Vec<FanoutReader>) {
        assert!(frame_len > 0, "Fan-out frame length must be greater than 0");
        assert!(consumers > 0, "Fan-out needs at least one consumer");

        let buffer = Arc::new(Self {
            frame: RwLock::new(sample::zeroed(frame_len)),
            consumers,
            data_ready: Barrier::new(consumers + 1),
            consumers_ready: Barrier::new(consumers + 1),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        let readers = (0..consumers)
            .map(|index| FanoutReader {
                buffer: Arc::clone(&buffer),
                index,
                initialized: AtomicBool::new(false),
                reading: AtomicBool::new(false),
                ended: AtomicBool::new(false),
            })
            .collect();

        (buffer, readers)
    }

    /// Number of samples in the shared frame
    pub fn frame_len(&self) -> usize {
        self.frame
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of attached consumers
    pub fn consumers(&self) -> usize {
        self.consumers
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Producer: wait until every consumer is done with the current frame
    /// (or, on the first call, done initializing).
    pub fn await_consumers(&self) {
        self.started.store(true, Ordering::Release);
        self.consumers_ready.wait();
    }

    /// Producer: open the write window for the next frame.
    ///
    /// Must only be called after [`await_consumers`](Self::await_consumers)
    /// or a previous [`FanoutWriter::release`].
    ///
    /// # Panics
    /// Panics if the buffer has been closed.
    pub fn begin_frame(&self) -> FanoutWriter<'_> {
        assert!(!self.is_closed(), "Frame written after fan-out was closed");
        FanoutWriter {
            buffer: self,
            frame: self.frame.write().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Producer: signal end of stream to every consumer.
    ///
    /// Performs one last `data_ready` wait so that consumers blocked on the
    /// next frame wake up and observe [`WorkError::EndOfStream`]. If the
    /// producer never got as far as [`await_consumers`](Self::await_consumers),
    /// the initial `consumers_ready` wait is done first. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Closing fan-out to {} consumers", self.consumers);
        if !self.started.swap(true, Ordering::AcqRel) {
            self.consumers_ready.wait();
        }
        self.data_ready.wait();
    }
}

impl std::fmt::Debug for FanoutBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutBuffer")
            .field("frame_len", &self.frame_len())
            .field("consumers", &self.consumers)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Producer write window returned by [`FanoutBuffer::begin_frame`]
pub struct FanoutWriter<'a> {
    buffer: &'a FanoutBuffer,
    frame: RwLockWriteGuard<'a, Vec<Sample>>,
}

impl FanoutWriter<'_> {
    pub fn frame_mut(&mut self) -> &mut [Sample] {
        &mut self.frame
    }

    /// Publish the frame and wait until every consumer has read it.
    pub fn release(self) {
        let FanoutWriter { buffer, frame } = self;
        drop(frame);
        buffer.data_ready.wait();
        buffer.consumers_ready.wait();
    }
}

/// Consumer side of a [`FanoutBuffer`], one per attached consumer
pub struct FanoutReader {
    buffer: Arc<FanoutBuffer>,
    index: usize,
    initialized: AtomicBool,
    // Between data_ready and consumers_ready of the current frame
    reading: AtomicBool,
    ended: AtomicBool,
}

impl FanoutReader {
    /// Position of this consumer among the buffer's readers
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn frame_len(&self) -> usize {
        self.buffer.frame_len()
    }

    /// Tell the producer this consumer has finished initializing.
    ///
    /// Only the first call waits; [`consume`](Self::consume) calls it
    /// implicitly.
    pub fn ready(&self) {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            self.buffer.consumers_ready.wait();
        }
    }

    /// Wait for the next frame and pass it to `f`.
    ///
    /// The frame borrow cannot escape `f`; once `f` returns this consumer is
    /// counted as done with the frame. Returns [`WorkError::EndOfStream`] when
    /// the producer has closed the buffer, and on every call after that.
    pub fn consume<R>(&self, f: impl FnOnce(&[Sample]) -> R) -> WorkResult<R> {
        if self.ended.load(Ordering::Acquire) {
            return Err(WorkError::EndOfStream);
        }
        self.ready();

        self.buffer.data_ready.wait();
        if self.buffer.is_closed() {
            self.ended.store(true, Ordering::Release);
            return Err(WorkError::EndOfStream);
        }

        self.reading.store(true, Ordering::Release);
        let result = {
            let frame = self
                .buffer
                .frame
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            f(&frame)
        };
        self.reading.store(false, Ordering::Release);
        self.buffer.consumers_ready.wait();
        Ok(result)
    }

    /// Stop reading but keep the producer and the other consumers moving.
    ///
    /// Finishes a frame cycle left open by a callback that unwound, then
    /// discards every further frame until the producer closes the buffer.
    /// Returns the number of frames discarded.
    pub fn discard_remaining(&self) -> usize {
        if self.reading.swap(false, Ordering::AcqRel) {
            self.buffer.consumers_ready.wait();
        }
        let mut discarded = 0;
        while self.consume(|_| ()).is_ok() {
            discarded += 1;
        }
        discarded
    }

    /// True once end of stream has been observed
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for FanoutReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutReader")
            .field("index", &self.index)
            .field("buffer", &self.buffer)
            .finish()
    }
}

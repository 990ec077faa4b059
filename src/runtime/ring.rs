//! Bounded blocking ring of complex samples
//!
//! A [`SampleRing`] connects exactly one writer to one reader. Writers block
//! while the ring is full, readers block until the requested number of samples
//! is available. Shutdown is cooperative: after [`SampleRing::signal_shutdown`]
//! the reader keeps being served until fewer samples than requested remain,
//! at which point reads return [`WorkError::EndOfStream`].

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use super::errors::{WorkError, WorkResult};
use super::sample::Sample;

/// Circular sample buffer with blocking read/write and a shutdown flag.
///
/// All state lives behind a single mutex. Waiting is done on two condition
/// variables, one for "data available" and one for "space available".
pub struct SampleRing {
    state: Mutex<RingState>,
    data_available: Condvar,
    space_available: Condvar,
    capacity: usize,
}

struct RingState {
    samples: VecDeque<Sample>,
    shutdown: bool,
}

impl SampleRing {
    /// Create a ring holding at most `capacity` samples.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Ring capacity must be greater than 0");
        Self {
            state: Mutex::new(RingState {
                samples: VecDeque::with_capacity(capacity),
                shutdown: false,
            }),
            data_available: Condvar::new(),
            space_available: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of samples the ring can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples currently buffered
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// Append all of `samples`, blocking while the ring is full.
    ///
    /// Large writes are split into as many pieces as needed; the reader is
    /// woken after every piece. Fails with [`WorkError::RingShutdown`] once
    /// shutdown has been signaled (samples appended before that stay in the
    /// ring).
    pub fn write(&self, samples: &[Sample]) -> WorkResult<()> {
        let mut remaining = samples;
        let mut state = self.lock();

        while !remaining.is_empty() {
            while state.samples.len() == self.capacity && !state.shutdown {
                state = self
                    .space_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if state.shutdown {
                return Err(WorkError::RingShutdown);
            }

            let free = self.capacity - state.samples.len();
            let (now, later) = remaining.split_at(free.min(remaining.len()));
            state.samples.extend(now.iter().copied());
            remaining = later;
            trace!("Ring write: {} samples, {} buffered", now.len(), state.samples.len());
            self.data_available.notify_all();
        }

        Ok(())
    }

    /// Append as many samples as currently fit without blocking.
    ///
    /// Returns the number of samples written.
    pub fn try_write(&self, samples: &[Sample]) -> WorkResult<usize> {
        let mut state = self.lock();
        if state.shutdown {
            return Err(WorkError::RingShutdown);
        }

        let count = (self.capacity - state.samples.len()).min(samples.len());
        if count > 0 {
            state.samples.extend(samples[..count].iter().copied());
            self.data_available.notify_all();
        }
        Ok(count)
    }

    /// Block until `n` samples are available and return a view of them.
    ///
    /// Returns [`WorkError::EndOfStream`] if shutdown has been signaled and
    /// fewer than `n` samples remain. While the ring is not shut down this
    /// never returns fewer than `n` samples. The returned guard holds the
    /// ring's lock; call [`RingRead::release`] to consume the samples.
    ///
    /// # Panics
    /// Panics if `n` is 0 or larger than the ring capacity, since such a read
    /// could never be satisfied.
    pub fn read(&self, n: usize) -> WorkResult<RingRead<'_>> {
        assert!(
            n > 0 && n <= self.capacity,
            "Read of {} samples from a ring of capacity {}",
            n,
            self.capacity
        );

        let mut state = self.lock();
        while state.samples.len() < n {
            if state.shutdown {
                debug!(
                    "Ring read of {} samples after shutdown, {} left: end of stream",
                    n,
                    state.samples.len()
                );
                return Err(WorkError::EndOfStream);
            }
            state = self
                .data_available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        Ok(RingRead {
            ring: self,
            state,
            len: n,
        })
    }

    /// Read exactly `dst.len()` samples into `dst` and release them.
    pub fn read_exact(&self, dst: &mut [Sample]) -> WorkResult<()> {
        let chunk = self.read(dst.len())?;
        chunk.copy_to(dst);
        chunk.release();
        Ok(())
    }

    /// Signal that no more data will be written.
    ///
    /// Idempotent. Wakes every blocked reader and writer.
    pub fn signal_shutdown(&self) {
        let mut state = self.lock();
        if !state.shutdown {
            state.shutdown = true;
            debug!("Ring shutdown signaled with {} samples buffered", state.samples.len());
        }
        self.data_available.notify_all();
        self.space_available.notify_all();
    }
}

impl std::fmt::Debug for SampleRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SampleRing")
            .field("capacity", &self.capacity)
            .field("len", &state.samples.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

/// Samples handed out by [`SampleRing::read`].
///
/// Holds the ring's lock for its lifetime. Dropping the guard without calling
/// [`release`](RingRead::release) leaves the samples in the ring.
pub struct RingRead<'a> {
    ring: &'a SampleRing,
    state: MutexGuard<'a, RingState>,
    len: usize,
}

impl RingRead<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Contiguous view of the requested samples.
    ///
    /// Rearranges the ring storage in place if the data wraps around.
    pub fn samples(&mut self) -> &[Sample] {
        let len = self.len;
        &self.state.samples.make_contiguous()[..len]
    }

    /// Copy the requested samples into `dst` without rearranging storage.
    ///
    /// # Panics
    /// Panics if `dst.len()` differs from the read size.
    pub fn copy_to(&self, dst: &mut [Sample]) {
        assert_eq!(dst.len(), self.len, "Destination does not match read size");
        let (head, tail) = self.state.samples.as_slices();
        if head.len() >= self.len {
            dst.copy_from_slice(&head[..self.len]);
        } else {
            let (first, rest) = dst.split_at_mut(head.len());
            first.copy_from_slice(head);
            rest.copy_from_slice(&tail[..rest.len()]);
        }
    }

    /// Consume the samples, freeing their space for the writer.
    pub fn release(mut self) {
        let len = self.len;
        self.state.samples.drain(..len);
        self.ring.space_available.notify_all();
    }
}

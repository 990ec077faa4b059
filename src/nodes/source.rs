//! Sample source block
//!
//! Feeds chunks from an iterator into a one-to-one output ring. Useful for
//! replaying captures or synthesized signals into a channelizer.

use tracing::{debug, info};

use crate::runtime::block::{BlockIo, BlockWorker, Producer, ProducerKind};
use crate::runtime::errors::{WorkError, WorkResult};
use crate::runtime::sample::Sample;
use crate::runtime::watchdog::Operation;

/// Source block writing iterator chunks to its output ring.
///
/// Stops when the iterator is exhausted, when a stop is requested, or when
/// the downstream ring has been shut down.
pub struct SampleSource<I> {
    chunks: I,
    max_transfer_unit: usize,
}

impl<I> SampleSource<I>
where
    I: Iterator<Item = Vec<Sample>> + Send + 'static,
{
    /// `max_transfer_unit` is the chunk size the downstream ring is sized
    /// for; longer chunks are written in pieces.
    pub fn new(chunks: I, max_transfer_unit: usize) -> Self {
        Self {
            chunks,
            max_transfer_unit: max_transfer_unit.max(1),
        }
    }
}

impl<I> BlockWorker for SampleSource<I>
where
    I: Iterator<Item = Vec<Sample>> + Send + 'static,
{
    fn name(&self) -> &str {
        "source"
    }

    fn producer(&self) -> Option<Producer> {
        Some(Producer {
            kind: ProducerKind::Single,
            max_transfer_unit: self.max_transfer_unit,
        })
    }

    fn run(&mut self, io: &BlockIo) -> WorkResult<usize> {
        let ring = io
            .output()
            .and_then(|port| port.ring())
            .ok_or_else(|| WorkError::BlockError("Missing output ring".into()))?;

        let mut written = 0;
        while !io.stop_requested() {
            let Some(chunk) = self.chunks.next() else {
                debug!("[{}] Input exhausted", io.name());
                break;
            };

            let _guard = io.watch(Operation::RingWrite);
            match ring.write(&chunk) {
                Ok(()) => written += chunk.len(),
                Err(WorkError::RingShutdown) => {
                    info!("[{}] Downstream ring closed", io.name());
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }
}

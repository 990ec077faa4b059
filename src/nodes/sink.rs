//! Fan-out consumer block
//!
//! A [`FrameSink`] attaches to a one-to-many producer and hands every
//! published frame to a callback while the frame is locked for reading.
//! The producer cannot move on until the callback returns, so slow
//! callbacks slow down every consumer of the same producer.

use crossbeam_channel::{Receiver, bounded};
use tracing::{debug, trace};

use crate::runtime::block::{BlockIo, BlockWorker, Consumer};
use crate::runtime::errors::{StartError, WorkError, WorkResult};
use crate::runtime::sample::Sample;
use crate::runtime::watchdog::Operation;

/// Callback type used by [`FrameSink::channel`]
pub type FrameCallback = Box<dyn FnMut(&[Sample]) + Send>;

/// Consumer block calling `on_frame` for every frame it is shown
pub struct FrameSink<F> {
    on_frame: F,
}

impl<F> FrameSink<F>
where
    F: FnMut(&[Sample]) + Send + 'static,
{
    pub fn new(on_frame: F) -> Self {
        Self { on_frame }
    }
}

impl FrameSink<FrameCallback> {
    /// Sink forwarding a copy of every frame over a bounded channel.
    ///
    /// A full channel holds the producer back. Frames are dropped once the
    /// receiver is gone, so the producer never waits on a missing reader.
    pub fn channel(bound: usize) -> (Self, Receiver<Vec<Sample>>) {
        let (tx, rx) = bounded(bound);
        let on_frame: FrameCallback = Box::new(move |frame: &[Sample]| {
            if tx.send(frame.to_vec()).is_err() {
                trace!("Frame receiver gone, dropping frame");
            }
        });
        (Self { on_frame }, rx)
    }
}

impl<F> BlockWorker for FrameSink<F>
where
    F: FnMut(&[Sample]) + Send + 'static,
{
    fn name(&self) -> &str {
        "sink"
    }

    fn consumer(&self) -> Option<Consumer> {
        Some(Consumer { min_read_unit: 1 })
    }

    fn prepare(&mut self, io: &BlockIo) -> Result<(), StartError> {
        if io.input().and_then(|port| port.fanout()).is_none() {
            return Err(StartError::NotWired {
                block: io.name().to_string(),
                side: "fan-out input",
            });
        }
        Ok(())
    }

    fn run(&mut self, io: &BlockIo) -> WorkResult<usize> {
        let reader = io
            .input()
            .and_then(|port| port.fanout())
            .ok_or_else(|| WorkError::BlockError("Missing fan-out input".into()))?;

        reader.ready();
        debug!(
            "[{}] Consumer {} ready for frames of {} samples",
            io.name(),
            reader.index(),
            reader.frame_len()
        );

        let mut frames = 0;
        loop {
            let _guard = io.watch(Operation::ConsumeFrame);
            match reader.consume(|frame| (self.on_frame)(frame)) {
                Ok(()) => frames += 1,
                Err(WorkError::EndOfStream) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::block::Block;
    use crate::runtime::fanout::FanoutBuffer;
    use crate::runtime::ports::InputPort;
    use crate::runtime::ring::SampleRing;
    use std::sync::Arc;

    #[test]
    fn test_ring_only_input_rejected() {
        let mut sink = FrameSink::new(|_: &[Sample]| {});
        let io = BlockIo::new(
            "sink",
            Some(InputPort::from_ring(Arc::new(SampleRing::new(4)))),
            None,
        );
        assert!(matches!(
            sink.prepare(&io),
            Err(StartError::NotWired { side: "fan-out input", .. })
        ));
    }

    #[test]
    fn test_channel_forwards_frames() {
        let (mut sink, frames) = FrameSink::channel(4);
        let (fanout, mut readers) = FanoutBuffer::new(4, 1);
        let io = BlockIo::new(
            "sink",
            Some(InputPort::with_fanout(
                Arc::new(SampleRing::new(1)),
                readers.remove(0),
            )),
            None,
        );
        sink.prepare(&io).unwrap();
        let consumer = std::thread::spawn(move || sink.run(&io));

        fanout.await_consumers();
        for k in 0..3 {
            let mut writer = fanout.begin_frame();
            writer.frame_mut().fill(Sample::new(k as f32, 0.0));
            writer.release();
        }
        fanout.close();

        assert_eq!(consumer.join().unwrap(), Ok(3));
        let received: Vec<Vec<Sample>> = frames.try_iter().collect();
        assert_eq!(received.len(), 3);
        assert_eq!(received[2], vec![Sample::new(2.0, 0.0); 4]);
    }

    #[test]
    fn test_dropped_receiver_does_not_stall() {
        let (mut sink, frames) = FrameSink::channel(1);
        drop(frames);
        let (fanout, mut readers) = FanoutBuffer::new(2, 1);
        let io = BlockIo::new(
            "sink",
            Some(InputPort::with_fanout(
                Arc::new(SampleRing::new(1)),
                readers.remove(0),
            )),
            None,
        );
        let consumer = std::thread::spawn(move || sink.run(&io));

        fanout.await_consumers();
        for _ in 0..5 {
            fanout.begin_frame().release();
        }
        fanout.close();
        assert_eq!(consumer.join().unwrap(), Ok(5));
    }

    #[test]
    fn test_declares_consumer_role() {
        let block = Block::new(FrameSink::new(|_: &[Sample]| {}));
        assert_eq!(block.min_read_unit(), Some(1));
        assert!(block.producer().is_none());
    }
}

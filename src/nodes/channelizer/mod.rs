//! Overlap-save FFT channelizer
//!
//! Reads `input_size` fresh samples per frame from its input ring, slides
//! them into an [`OverlapWindow`] of `fft_size` samples, runs a forward FFT
//! directly in the fan-out frame and publishes the reordered spectrum to
//! every attached consumer in lock-step.
//!
//! ```text
//! ring --read(input_size)--> window --copy--> frame --fft--> swap_sides --> consumers
//! ```

mod design;
mod spectrum;
mod window;

pub use design::{ChannelizerConfig, DesignError, MAX_FFT_SIZE};
pub use spectrum::{peak_bin, restore_sides, swap_sides};
pub use window::OverlapWindow;

use std::sync::Arc;

use rustfft::{Fft, FftPlanner};
use tracing::{debug, info, trace};

use crate::runtime::block::{Block, BlockIo, BlockWorker, Consumer, Producer, ProducerKind};
use crate::runtime::errors::{StartError, WorkError, WorkResult};
use crate::runtime::fanout::{FanoutBuffer, FanoutWriter};
use crate::runtime::ring::{RingRead, SampleRing};
use crate::runtime::sample::{self, Sample};
use crate::runtime::watchdog::Operation;

/// Per-frame processing steps
enum State<'a> {
    AwaitConsumersReady,
    AwaitData,
    Accumulate(RingRead<'a>),
    Transform,
    Reorder(FanoutWriter<'a>),
    ReleaseFrame(FanoutWriter<'a>),
    Shutdown,
}

/// Channelizer worker
///
/// Consumer of `input_size` samples, `Multi` producer of `fft_size` bins.
pub struct Channelizer {
    config: ChannelizerConfig,
    window: OverlapWindow,
    fft: Option<Arc<dyn Fft<f32>>>,
    scratch: Vec<Sample>,
    frames: usize,
}

impl Channelizer {
    pub fn new(config: ChannelizerConfig) -> Self {
        Self {
            window: OverlapWindow::new(config.fft_size(), config.overlap_length()),
            config,
            fft: None,
            scratch: Vec::new(),
            frames: 0,
        }
    }

    /// Design the frame geometry and wrap the worker in a block.
    ///
    /// The block still has to be wired (see
    /// [`BlockConnection`](crate::BlockConnection)) before it is started.
    pub fn create(decimation: i32, transition_bw: f32) -> Result<Block, DesignError> {
        let config = ChannelizerConfig::design(decimation, transition_bw)?;
        info!("[fft] {}", config);
        Ok(Block::new(Self::new(config)))
    }

    pub fn config(&self) -> &ChannelizerConfig {
        &self.config
    }

    fn ports<'a>(&self, io: &'a BlockIo) -> WorkResult<(&'a SampleRing, &'a FanoutBuffer)> {
        let input = io
            .input()
            .map(|port| port.ring())
            .ok_or_else(|| WorkError::BlockError("Missing input ring".into()))?;
        let output = io
            .output()
            .and_then(|port| port.fanout())
            .ok_or_else(|| WorkError::BlockError("Missing fan-out output".into()))?;
        Ok((input, output))
    }
}

impl BlockWorker for Channelizer {
    fn name(&self) -> &str {
        "fft"
    }

    fn producer(&self) -> Option<Producer> {
        Some(Producer {
            kind: ProducerKind::Multi,
            max_transfer_unit: self.config.fft_size(),
        })
    }

    fn consumer(&self) -> Option<Consumer> {
        Some(Consumer {
            min_read_unit: self.config.input_size(),
        })
    }

    fn prepare(&mut self, io: &BlockIo) -> Result<(), StartError> {
        let fft_size = self.config.fft_size();
        let plan_failure = |reason: String| StartError::PlanCreationFailure {
            block: io.name().to_string(),
            reason,
        };

        let frame_len = io
            .output()
            .and_then(|port| port.fanout())
            .map(|fanout| fanout.frame_len())
            .ok_or_else(|| plan_failure("output is not a fan-out frame".into()))?;
        if frame_len != fft_size {
            return Err(plan_failure(format!(
                "frame is {} samples, transform needs {}",
                frame_len, fft_size
            )));
        }

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        if fft.len() != fft_size {
            return Err(plan_failure(format!(
                "planner returned a transform of {} samples",
                fft.len()
            )));
        }

        self.scratch = sample::zeroed(fft.get_inplace_scratch_len());
        self.window.reset();
        self.fft = Some(fft);
        debug!("[{}] Forward FFT of {} samples planned", io.name(), fft_size);
        Ok(())
    }

    fn run(&mut self, io: &BlockIo) -> WorkResult<usize> {
        let (input, fanout) = self.ports(io)?;
        let fft = self
            .fft
            .clone()
            .ok_or_else(|| WorkError::BlockError("Transform not planned".into()))?;
        let input_size = self.config.input_size();

        let mut state = State::AwaitConsumersReady;
        loop {
            state = match state {
                State::AwaitConsumersReady => {
                    debug!("[{}] Waiting for {} consumer(s)", io.name(), fanout.consumers());
                    let _guard = io.watch(Operation::AwaitConsumers);
                    fanout.await_consumers();
                    State::AwaitData
                }
                State::AwaitData => {
                    let _guard = io.watch(Operation::RingRead);
                    match input.read(input_size) {
                        Ok(chunk) => State::Accumulate(chunk),
                        Err(WorkError::EndOfStream) => State::Shutdown,
                        Err(e) => return Err(e),
                    }
                }
                State::Accumulate(chunk) => {
                    // The ring only hands out full reads of input_size
                    chunk.copy_to(self.window.advance());
                    chunk.release();
                    State::Transform
                }
                State::Transform => {
                    let mut writer = fanout.begin_frame();
                    let frame = writer.frame_mut();
                    frame.copy_from_slice(self.window.as_slice());
                    fft.process_with_scratch(frame, &mut self.scratch);
                    State::Reorder(writer)
                }
                State::Reorder(mut writer) => {
                    swap_sides(writer.frame_mut());
                    State::ReleaseFrame(writer)
                }
                State::ReleaseFrame(writer) => {
                    let _guard = io.watch(Operation::ReleaseFrame);
                    writer.release();
                    self.frames += 1;
                    trace!("[{}] Frame {} released", io.name(), self.frames);
                    State::AwaitData
                }
                State::Shutdown => {
                    io.finish();
                    info!(
                        "[{}] Input drained after {} frame(s)",
                        io.name(),
                        self.frames
                    );
                    return Ok(self.frames);
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::connection::BlockConnection;
    use crate::runtime::ports::{InputPort, OutputPort};

    struct Drain;

    impl BlockWorker for Drain {
        fn name(&self) -> &str {
            "drain"
        }

        fn consumer(&self) -> Option<Consumer> {
            Some(Consumer { min_read_unit: 1 })
        }

        fn run(&mut self, io: &BlockIo) -> WorkResult<usize> {
            let reader = io
                .input()
                .and_then(|port| port.fanout())
                .ok_or_else(|| WorkError::BlockError("Missing fan-out input".into()))?;
            let mut frames = 0;
            while reader.consume(|_| ()).is_ok() {
                frames += 1;
            }
            Ok(frames)
        }
    }

    #[test]
    fn test_block_roles() {
        let block = Channelizer::create(4, 0.1).unwrap();
        assert_eq!(block.name(), "fft");
        assert_eq!(block.max_transfer_unit(), Some(128));
        assert_eq!(block.min_read_unit(), Some(88));
        assert_eq!(block.producer().map(|p| p.kind), Some(ProducerKind::Multi));
    }

    #[test]
    fn test_create_rejects_infeasible_design() {
        assert!(matches!(
            Channelizer::create(0, 0.1),
            Err(DesignError::InvalidDecimation(0))
        ));
    }

    #[test]
    fn test_frame_length_mismatch_fails_plan() {
        let config = ChannelizerConfig::design(4, 0.1).unwrap();
        let mut worker = Channelizer::new(config);
        let (fanout, _readers) = FanoutBuffer::new(64, 1);
        let io = BlockIo::new(
            "fft",
            None,
            Some(OutputPort::Multi {
                fanout,
                consumer_rings: Vec::new(),
            }),
        );
        let err = worker.prepare(&io).unwrap_err();
        assert!(matches!(err, StartError::PlanCreationFailure { .. }));
        assert!(err.to_string().contains("64"));
    }

    #[test]
    fn test_single_output_fails_plan() {
        let config = ChannelizerConfig::design(4, 0.1).unwrap();
        let mut worker = Channelizer::new(config);
        let io = BlockIo::new(
            "fft",
            None,
            Some(OutputPort::Single {
                ring: Arc::new(SampleRing::new(4)),
            }),
        );
        assert!(matches!(
            worker.prepare(&io),
            Err(StartError::PlanCreationFailure { .. })
        ));
    }

    #[test]
    fn test_dc_input_lands_in_center_bin() {
        let config = ChannelizerConfig::design(4, 0.1).unwrap();
        let mut worker = Channelizer::new(config);
        let ring = Arc::new(SampleRing::new(config.input_size() * 4));
        let (fanout, mut readers) = FanoutBuffer::new(config.fft_size(), 1);
        let io = BlockIo::new(
            "fft",
            Some(InputPort::from_ring(Arc::clone(&ring))),
            Some(OutputPort::Multi {
                fanout,
                consumer_rings: vec![Arc::new(SampleRing::new(1))],
            }),
        );
        worker.prepare(&io).unwrap();

        let reader = readers.remove(0);
        let consumer = std::thread::spawn(move || {
            let mut peaks = Vec::new();
            while let Ok(peak) = reader.consume(peak_bin) {
                peaks.push(peak);
            }
            peaks
        });
        let producer = std::thread::spawn(move || worker.run(&io));

        ring.write(&vec![Sample::new(1.0, 0.0); config.input_size() * 3])
            .unwrap();
        ring.signal_shutdown();

        assert_eq!(producer.join().unwrap(), Ok(3));
        let peaks = consumer.join().unwrap();
        assert_eq!(peaks.len(), 3);
        // Once the window is full of DC all energy sits in the middle bin
        assert_eq!(peaks[2], Some(config.fft_size() / 2));
    }

    #[test]
    fn test_uneven_writes_yield_whole_frames() {
        let config = ChannelizerConfig::design(4, 0.1).unwrap();
        let mut worker = Channelizer::new(config);
        let ring = Arc::new(SampleRing::new(config.input_size()));
        let (fanout, mut readers) = FanoutBuffer::new(config.fft_size(), 1);
        let io = BlockIo::new(
            "fft",
            Some(InputPort::from_ring(Arc::clone(&ring))),
            Some(OutputPort::Multi {
                fanout,
                consumer_rings: vec![Arc::new(SampleRing::new(1))],
            }),
        );
        worker.prepare(&io).unwrap();

        let reader = readers.remove(0);
        let center = config.fft_size() / 2;
        let consumer = std::thread::spawn(move || {
            let mut dc = Vec::new();
            while let Ok(bin) = reader.consume(|frame| frame[center]) {
                dc.push(bin);
            }
            dc
        });
        let producer = std::thread::spawn(move || worker.run(&io));

        // Pieces that never line up with the read size
        let signal = vec![Sample::new(1.0, 0.0); config.input_size() * 3];
        for piece in signal.chunks(7) {
            ring.write(piece).unwrap();
        }
        ring.signal_shutdown();

        assert_eq!(producer.join().unwrap(), Ok(3));
        let dc = consumer.join().unwrap();
        assert_eq!(dc.len(), 3);
        // Overlap still zero in the first frame, full window of ones after
        assert!((dc[0].re - config.input_size() as f32).abs() < 1e-3);
        assert!((dc[2].re - config.fft_size() as f32).abs() < 1e-3);
    }

    #[test]
    fn test_wired_block_starts_and_drains() {
        let mut fft = Channelizer::create(4, 0.1).unwrap();
        let mut drain = Block::new(Drain);
        let input = BlockConnection::external_input(&mut fft).unwrap();
        BlockConnection::one_to_many(&mut fft, [&mut drain]).unwrap();

        drain.start().unwrap();
        fft.start().unwrap();
        input.write(&vec![Sample::new(0.5, 0.5); 88 * 2]).unwrap();
        fft.request_shutdown();

        fft.join().unwrap();
        drain.join().unwrap();
        assert!(!fft.is_running());
        assert!(drain.input_ring().unwrap().is_shutdown());
    }
}

//! Threaded overlap-save FFT channelizer
//!
//! Splits a wideband complex sample stream into overlapping FFT frames and
//! shares every reordered spectrum with any number of downstream consumers,
//! each running on its own thread.
//!
//! # Architecture
//!
//! - **SampleRing**: bounded blocking ring between one writer and one reader
//! - **FanoutBuffer**: one frame shared in lock-step by a producer and N consumers
//! - **BlockConnection**: wiring that sizes buffers from declared transfer units
//! - **Channelizer**: overlap-save FFT stage feeding a fan-out
//! - **Pipeline / Scheduler**: name-addressed graph building and thread lifecycle
//!
//! # Example
//!
//! ```no_run
//! use chanpipe::{Block, Channelizer, FrameSink, Pipeline};
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add_block(Channelizer::create(4, 0.1)?)?;
//! let (sink, spectra) = FrameSink::channel(8);
//! pipeline.add_block(Block::new(sink))?;
//! pipeline.connect_one_to_many("fft", &["sink"])?;
//! let input = pipeline.input("fft")?;
//!
//! let mut scheduler = pipeline.build()?;
//! input.write(&vec![chanpipe::Sample::new(1.0, 0.0); 88])?;
//! let spectrum = spectra.recv().expect("one frame");
//! assert_eq!(spectrum.len(), 128);
//!
//! scheduler.stop();
//! scheduler.wait();
//! # Ok::<(), chanpipe::Error>(())
//! ```

use thiserror::Error;

pub mod nodes;
pub mod runtime;

pub use nodes::channelizer::{
    Channelizer, ChannelizerConfig, DesignError, MAX_FFT_SIZE, OverlapWindow, peak_bin,
    restore_sides, swap_sides,
};
pub use nodes::{FrameSink, SampleSource};

pub use runtime::{
    Block, BlockConnection, BlockIo, BlockWorker, ConnectionError, Consumer, FanoutBuffer,
    FanoutReader, Pipeline, Producer, ProducerKind, Sample, SampleRing, Scheduler, StartError,
    WorkError, WorkResult,
};

/// Any error surfaced while designing, wiring, starting or running blocks
#[derive(Error, Debug)]
pub enum Error {
    #[error("Design error: {0}")]
    Design(#[from] DesignError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Start error: {0}")]
    Start(#[from] StartError),

    #[error("Work error: {0}")]
    Work(#[from] WorkError),
}

pub type Result<T> = std::result::Result<T, Error>;

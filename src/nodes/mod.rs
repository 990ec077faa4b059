//! Processing blocks
//!
//! - **Channelizer**: overlap-save FFT stage publishing spectra to N consumers
//! - **SampleSource**: feeds iterator chunks into a ring
//! - **FrameSink**: fan-out consumer invoking a callback per frame
//!
//! # Examples
//!
//! ```no_run
//! use chanpipe::{Block, Channelizer, FrameSink, Pipeline};
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.add_block(Channelizer::create(4, 0.1)?)?;
//! let (sink, frames) = FrameSink::channel(16);
//! pipeline.add_block(Block::new(sink))?;
//! pipeline.connect_one_to_many("fft", &["sink"])?;
//! let input = pipeline.input("fft")?;
//! let mut scheduler = pipeline.build()?;
//! // ... write samples into `input`, read spectra from `frames`
//! scheduler.stop();
//! scheduler.wait();
//! # Ok::<(), chanpipe::Error>(())
//! ```

pub mod channelizer;
mod sink;
mod source;

pub use channelizer::{Channelizer, ChannelizerConfig, DesignError, OverlapWindow};
pub use sink::{FrameCallback, FrameSink};
pub use source::SampleSource;

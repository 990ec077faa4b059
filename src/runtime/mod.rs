//! Runtime support for threaded block graphs

pub mod block;
pub mod connection;
pub mod errors;
pub mod fanout;
pub mod pipeline;
pub mod ports;
pub mod ring;
pub mod sample;
pub mod scheduler;
pub mod watchdog;

pub use block::{Block, BlockIo, BlockWorker, Consumer, Producer, ProducerKind};
pub use connection::{BlockConnection, DEFAULT_RING_MULTIPLIER};
pub use errors::{ConnectionError, StartError, WorkError, WorkResult};
pub use fanout::{FanoutBuffer, FanoutReader, FanoutWriter};
pub use pipeline::Pipeline;
pub use ports::{InputPort, OutputPort};
pub use ring::{RingRead, SampleRing};
pub use sample::Sample;
pub use scheduler::Scheduler;
pub use watchdog::{Operation, OperationGuard, Watchdog, WatchdogHandle};

//! Block endpoints created by the wiring layer
//!
//! An [`InputPort`] is what a consumer block reads from: its own
//! [`SampleRing`], plus a [`FanoutReader`] when it is fed by a one-to-many
//! producer. An [`OutputPort`] is the producer's end of the same connection.

use std::sync::Arc;

use super::fanout::{FanoutBuffer, FanoutReader};
use super::ring::SampleRing;

/// Consumer end of a connection
#[derive(Debug)]
pub struct InputPort {
    ring: Arc<SampleRing>,
    fanout: Option<FanoutReader>,
}

impl InputPort {
    /// Input fed through a ring only (one-to-one or external writer)
    pub(crate) fn from_ring(ring: Arc<SampleRing>) -> Self {
        Self { ring, fanout: None }
    }

    /// Input fed by a one-to-many producer
    pub(crate) fn with_fanout(ring: Arc<SampleRing>, reader: FanoutReader) -> Self {
        Self {
            ring,
            fanout: Some(reader),
        }
    }

    /// The consumer's input ring
    pub fn ring(&self) -> &SampleRing {
        &self.ring
    }

    pub(crate) fn shared_ring(&self) -> Arc<SampleRing> {
        Arc::clone(&self.ring)
    }

    /// The shared frame reader, if this input is fed by a fan-out
    pub fn fanout(&self) -> Option<&FanoutReader> {
        self.fanout.as_ref()
    }
}

/// Producer end of a connection
#[derive(Debug)]
pub enum OutputPort {
    /// One producer writing one consumer's ring
    Single { ring: Arc<SampleRing> },
    /// One producer sharing frames with every consumer
    Multi {
        fanout: Arc<FanoutBuffer>,
        consumer_rings: Vec<Arc<SampleRing>>,
    },
}

impl OutputPort {
    /// Downstream ring of a one-to-one connection
    pub fn ring(&self) -> Option<&SampleRing> {
        match self {
            OutputPort::Single { ring } => Some(ring),
            OutputPort::Multi { .. } => None,
        }
    }

    /// Shared frame buffer of a one-to-many connection
    pub fn fanout(&self) -> Option<&FanoutBuffer> {
        match self {
            OutputPort::Single { .. } => None,
            OutputPort::Multi { fanout, .. } => Some(fanout),
        }
    }

    /// Number of consumers behind this port
    pub fn num_consumers(&self) -> usize {
        match self {
            OutputPort::Single { .. } => 1,
            OutputPort::Multi { consumer_rings, .. } => consumer_rings.len(),
        }
    }

    /// Propagate end of stream downstream.
    ///
    /// Signals shutdown on every consumer ring, then closes the fan-out so
    /// that consumers waiting for the next frame wake up.
    pub fn shutdown(&self) {
        match self {
            OutputPort::Single { ring } => ring.signal_shutdown(),
            OutputPort::Multi {
                fanout,
                consumer_rings,
            } => {
                for ring in consumer_rings {
                    ring.signal_shutdown();
                }
                fanout.close();
            }
        }
    }
}

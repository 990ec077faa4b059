//! Wiring between blocks
//!
//! Buffers are allocated here rather than in the block factories because
//! their sizes depend on both ends of a connection: the producer's
//! `max_transfer_unit` and each consumer's `min_read_unit`. Wiring must
//! happen after every block involved has been created and before any of
//! them is started.

use std::sync::Arc;
use tracing::debug;

use super::block::{Block, ProducerKind};
use super::errors::ConnectionError;
use super::fanout::FanoutBuffer;
use super::ports::{InputPort, OutputPort};
use super::ring::SampleRing;

/// Rings hold this many transfer units unless configured otherwise
pub const DEFAULT_RING_MULTIPLIER: usize = 4;

/// Description of a wired producer output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockConnection {
    pub producer: String,
    pub consumers: Vec<String>,
    pub kind: ProducerKind,
    /// Producer transfer unit (fan-out frame length for `Multi`)
    pub max_transfer_unit: usize,
    /// Declared read unit of each consumer, in `consumers` order
    pub min_read_units: Vec<usize>,
    /// Allocated ring capacity of each consumer, in `consumers` order
    pub ring_capacities: Vec<usize>,
}

fn ring_capacity(unit: usize, ring_multiplier: usize) -> usize {
    unit.max(1) * ring_multiplier.max(1)
}

fn check_producer(producer: &Block, expected: ProducerKind) -> Result<usize, ConnectionError> {
    if producer.is_started() {
        return Err(ConnectionError::AlreadyStarted(producer.name().to_string()));
    }
    let role = producer
        .producer()
        .ok_or_else(|| ConnectionError::NotAProducer(producer.name().to_string()))?;
    if role.kind != expected {
        return Err(ConnectionError::ProducerKindMismatch {
            block: producer.name().to_string(),
            expected,
            actual: role.kind,
        });
    }
    if producer.has_output() {
        return Err(ConnectionError::AlreadyConnected(format!(
            "Output of block '{}' is already connected",
            producer.name()
        )));
    }
    Ok(role.max_transfer_unit)
}

fn check_consumer(consumer: &Block) -> Result<usize, ConnectionError> {
    if consumer.is_started() {
        return Err(ConnectionError::AlreadyStarted(consumer.name().to_string()));
    }
    let role = consumer
        .consumer()
        .ok_or_else(|| ConnectionError::NotAConsumer(consumer.name().to_string()))?;
    if consumer.has_input() {
        return Err(ConnectionError::AlreadyConnected(format!(
            "Input of block '{}' is already connected",
            consumer.name()
        )));
    }
    Ok(role.min_read_unit)
}

impl BlockConnection {
    /// Wire a `Multi` producer to one or more consumers sharing its frames.
    ///
    /// Allocates one [`FanoutBuffer`] of `max_transfer_unit` samples with
    /// `consumers + 1` barrier parties and one [`SampleRing`] per consumer.
    pub fn one_to_many<'a>(
        producer: &mut Block,
        consumers: impl IntoIterator<Item = &'a mut Block>,
    ) -> Result<Self, ConnectionError> {
        Self::one_to_many_with(DEFAULT_RING_MULTIPLIER, producer, consumers)
    }

    /// [`one_to_many`](Self::one_to_many) with an explicit ring size multiplier
    pub fn one_to_many_with<'a>(
        ring_multiplier: usize,
        producer: &mut Block,
        consumers: impl IntoIterator<Item = &'a mut Block>,
    ) -> Result<Self, ConnectionError> {
        let max_transfer_unit = check_producer(producer, ProducerKind::Multi)?;
        let mut consumers: Vec<&mut Block> = consumers.into_iter().collect();
        if consumers.is_empty() {
            return Err(ConnectionError::NoConsumers(producer.name().to_string()));
        }
        let min_read_units = consumers
            .iter()
            .map(|consumer| check_consumer(consumer))
            .collect::<Result<Vec<_>, _>>()?;

        let (fanout, readers) = FanoutBuffer::new(max_transfer_unit, consumers.len());
        let mut consumer_rings = Vec::with_capacity(consumers.len());
        let mut ring_capacities = Vec::with_capacity(consumers.len());

        for ((consumer, reader), min_read_unit) in
            consumers.iter_mut().zip(readers).zip(&min_read_units)
        {
            let capacity = ring_capacity(*min_read_unit, ring_multiplier);
            let ring = Arc::new(SampleRing::new(capacity));
            consumer.set_input(InputPort::with_fanout(Arc::clone(&ring), reader));
            consumer_rings.push(ring);
            ring_capacities.push(capacity);
        }
        producer.set_output(OutputPort::Multi {
            fanout,
            consumer_rings,
        });

        let connection = Self {
            producer: producer.name().to_string(),
            consumers: consumers.iter().map(|c| c.name().to_string()).collect(),
            kind: ProducerKind::Multi,
            max_transfer_unit,
            min_read_units,
            ring_capacities,
        };
        debug!(
            "Connected {} -> {:?} (frame {} samples)",
            connection.producer, connection.consumers, max_transfer_unit
        );
        Ok(connection)
    }

    /// Wire a `Single` producer to exactly one consumer through a ring
    pub fn one_to_one(producer: &mut Block, consumer: &mut Block) -> Result<Self, ConnectionError> {
        Self::one_to_one_with(DEFAULT_RING_MULTIPLIER, producer, consumer)
    }

    /// [`one_to_one`](Self::one_to_one) with an explicit ring size multiplier
    pub fn one_to_one_with(
        ring_multiplier: usize,
        producer: &mut Block,
        consumer: &mut Block,
    ) -> Result<Self, ConnectionError> {
        let max_transfer_unit = check_producer(producer, ProducerKind::Single)?;
        let min_read_unit = check_consumer(consumer)?;

        let capacity = ring_capacity(max_transfer_unit.max(min_read_unit), ring_multiplier);
        let ring = Arc::new(SampleRing::new(capacity));
        consumer.set_input(InputPort::from_ring(Arc::clone(&ring)));
        producer.set_output(OutputPort::Single { ring });

        let connection = Self {
            producer: producer.name().to_string(),
            consumers: vec![consumer.name().to_string()],
            kind: ProducerKind::Single,
            max_transfer_unit,
            min_read_units: vec![min_read_unit],
            ring_capacities: vec![capacity],
        };
        debug!(
            "Connected {} -> {} (ring {} samples)",
            connection.producer, connection.consumers[0], capacity
        );
        Ok(connection)
    }

    /// Give a consumer an input ring fed from outside the block graph.
    ///
    /// Returns the ring for the external writer to write into.
    pub fn external_input(consumer: &mut Block) -> Result<Arc<SampleRing>, ConnectionError> {
        Self::external_input_with(DEFAULT_RING_MULTIPLIER, consumer)
    }

    /// [`external_input`](Self::external_input) with an explicit ring size multiplier
    pub fn external_input_with(
        ring_multiplier: usize,
        consumer: &mut Block,
    ) -> Result<Arc<SampleRing>, ConnectionError> {
        let min_read_unit = check_consumer(consumer)?;
        let ring = Arc::new(SampleRing::new(ring_capacity(min_read_unit, ring_multiplier)));
        consumer.set_input(InputPort::from_ring(Arc::clone(&ring)));
        debug!(
            "External input for {} (ring {} samples)",
            consumer.name(),
            ring.capacity()
        );
        Ok(ring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::block::{BlockIo, BlockWorker, Consumer, Producer};
    use crate::runtime::errors::WorkResult;

    struct Stage {
        producer: Option<Producer>,
        consumer: Option<Consumer>,
    }

    impl BlockWorker for Stage {
        fn name(&self) -> &str {
            "stage"
        }

        fn producer(&self) -> Option<Producer> {
            self.producer
        }

        fn consumer(&self) -> Option<Consumer> {
            self.consumer
        }

        fn run(&mut self, _io: &BlockIo) -> WorkResult<usize> {
            Ok(0)
        }
    }

    fn multi(name: &str, frame: usize) -> Block {
        Block::new(Stage {
            producer: Some(Producer {
                kind: ProducerKind::Multi,
                max_transfer_unit: frame,
            }),
            consumer: None,
        })
        .with_name(name)
    }

    fn single(name: &str, unit: usize) -> Block {
        Block::new(Stage {
            producer: Some(Producer {
                kind: ProducerKind::Single,
                max_transfer_unit: unit,
            }),
            consumer: None,
        })
        .with_name(name)
    }

    fn sink(name: &str, unit: usize) -> Block {
        Block::new(Stage {
            producer: None,
            consumer: Some(Consumer {
                min_read_unit: unit,
            }),
        })
        .with_name(name)
    }

    #[test]
    fn test_one_to_many_sizes_buffers() {
        let mut producer = multi("fft", 128);
        let mut a = sink("a", 10);
        let mut b = sink("b", 1);

        let conn = BlockConnection::one_to_many(&mut producer, [&mut a, &mut b]).unwrap();
        assert_eq!(conn.consumers, vec!["a", "b"]);
        assert_eq!(conn.max_transfer_unit, 128);
        assert_eq!(conn.ring_capacities, vec![40, 4]);

        for consumer in [&a, &b] {
            let ring = consumer.input_ring().unwrap();
            assert!(ring.capacity() >= consumer.min_read_unit().unwrap());
        }
    }

    #[test]
    fn test_one_to_many_requires_consumers() {
        let mut producer = multi("fft", 128);
        let err = BlockConnection::one_to_many(&mut producer, []).unwrap_err();
        assert!(matches!(err, ConnectionError::NoConsumers(_)));
    }

    #[test]
    fn test_producer_kind_checked() {
        let mut producer = single("source", 64);
        let mut consumer = sink("sink", 1);
        let err = BlockConnection::one_to_many(&mut producer, [&mut consumer]).unwrap_err();
        assert!(matches!(err, ConnectionError::ProducerKindMismatch { .. }));
        // Nothing was wired by the failed attempt
        assert!(consumer.input_ring().is_none());
    }

    #[test]
    fn test_input_wired_once() {
        let mut first = single("first", 64);
        let mut second = single("second", 64);
        let mut consumer = sink("sink", 16);

        let conn = BlockConnection::one_to_one(&mut first, &mut consumer).unwrap();
        assert_eq!(conn.ring_capacities, vec![256]);

        let err = BlockConnection::one_to_one(&mut second, &mut consumer).unwrap_err();
        assert!(err.to_string().contains("already connected"));
    }

    #[test]
    fn test_consumer_role_required() {
        let mut producer = multi("fft", 32);
        let mut other = multi("other", 32);
        let err = BlockConnection::one_to_many(&mut producer, [&mut other]).unwrap_err();
        assert!(matches!(err, ConnectionError::NotAConsumer(_)));
    }

    #[test]
    fn test_external_input() {
        let mut consumer = sink("fft", 88);
        let ring = BlockConnection::external_input_with(2, &mut consumer).unwrap();
        assert_eq!(ring.capacity(), 176);
        assert!(Arc::ptr_eq(&ring, consumer.input_ring().unwrap()));
    }
}

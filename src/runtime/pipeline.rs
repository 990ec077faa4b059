//! Pipeline builder for constructing block graphs

use super::block::Block;
use super::connection::{BlockConnection, DEFAULT_RING_MULTIPLIER};
use super::errors::{ConnectionError, StartError};
use super::ring::SampleRing;
use super::scheduler::Scheduler;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Pipeline builder that manages blocks and connections by name
pub struct Pipeline {
    blocks: Vec<Block>,
    block_names: HashMap<String, usize>,
    connections: Vec<BlockConnection>,
    external_inputs: HashSet<usize>,
    ring_multiplier: usize,
    watchdog: bool,
}

impl Pipeline {
    /// Create a new pipeline
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            block_names: HashMap::new(),
            connections: Vec::new(),
            external_inputs: HashSet::new(),
            ring_multiplier: DEFAULT_RING_MULTIPLIER,
            watchdog: true,
        }
    }

    /// Set how many transfer units each ring holds
    pub fn with_ring_multiplier(mut self, multiplier: usize) -> Self {
        self.ring_multiplier = multiplier.max(1);
        self
    }

    /// Enable or disable the blocked-operation watchdog
    pub fn with_watchdog(mut self, enabled: bool) -> Self {
        self.watchdog = enabled;
        self
    }

    /// Add a block under its own name
    pub fn add_block(&mut self, block: Block) -> Result<(), ConnectionError> {
        let name = block.name().to_string();
        if self.block_names.contains_key(&name) {
            return Err(ConnectionError::DuplicateBlock(name));
        }
        if block.is_started() {
            return Err(ConnectionError::AlreadyStarted(name));
        }

        self.block_names.insert(name, self.blocks.len());
        self.blocks.push(block);
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<usize, ConnectionError> {
        self.block_names
            .get(name)
            .copied()
            .ok_or_else(|| ConnectionError::BlockNotFound(name.to_string()))
    }

    /// Share every frame of `from` with each block in `to`
    pub fn connect_one_to_many(
        &mut self,
        from: &str,
        to: &[&str],
    ) -> Result<&BlockConnection, ConnectionError> {
        let from_id = self.index_of(from)?;
        let mut to_ids = Vec::with_capacity(to.len());
        for name in to {
            let id = self.index_of(name)?;
            if id == from_id {
                return Err(ConnectionError::SelfConnection(from.to_string()));
            }
            if to_ids.contains(&id) {
                return Err(ConnectionError::AlreadyConnected(format!(
                    "Block '{}' listed twice as consumer of '{}'",
                    name, from
                )));
            }
            to_ids.push(id);
        }

        // Split the block list into the producer and its consumers, keeping
        // the consumer order given by the caller
        let mut producer = None;
        let mut consumers: Vec<(usize, &mut Block)> = Vec::with_capacity(to_ids.len());
        for (id, block) in self.blocks.iter_mut().enumerate() {
            if id == from_id {
                producer = Some(block);
            } else if let Some(pos) = to_ids.iter().position(|&t| t == id) {
                consumers.push((pos, block));
            }
        }
        consumers.sort_by_key(|(pos, _)| *pos);
        let producer = producer.ok_or_else(|| ConnectionError::BlockNotFound(from.to_string()))?;

        let connection = BlockConnection::one_to_many_with(
            self.ring_multiplier,
            producer,
            consumers.into_iter().map(|(_, block)| block),
        )?;
        self.connections.push(connection);
        Ok(&self.connections[self.connections.len() - 1])
    }

    /// Connect `from` to `to` through a single ring
    pub fn connect_one_to_one(
        &mut self,
        from: &str,
        to: &str,
    ) -> Result<&BlockConnection, ConnectionError> {
        let from_id = self.index_of(from)?;
        let to_id = self.index_of(to)?;
        if from_id == to_id {
            return Err(ConnectionError::SelfConnection(from.to_string()));
        }

        let (low, high) = self.blocks.split_at_mut(from_id.max(to_id));
        let (producer, consumer) = if from_id < to_id {
            (&mut low[from_id], &mut high[0])
        } else {
            (&mut high[0], &mut low[to_id])
        };

        let connection =
            BlockConnection::one_to_one_with(self.ring_multiplier, producer, consumer)?;
        self.connections.push(connection);
        Ok(&self.connections[self.connections.len() - 1])
    }

    /// Create the input ring of `name` for a writer outside the pipeline
    pub fn input(&mut self, name: &str) -> Result<Arc<SampleRing>, ConnectionError> {
        let id = self.index_of(name)?;
        let ring =
            BlockConnection::external_input_with(self.ring_multiplier, &mut self.blocks[id])?;
        self.external_inputs.insert(id);
        Ok(ring)
    }

    /// All connections made so far
    pub fn connections(&self) -> &[BlockConnection] {
        &self.connections
    }

    /// List all block names
    pub fn list_blocks(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.name()).collect()
    }

    /// Prepare every block, then start them all.
    ///
    /// If any block fails to prepare, no thread is started.
    pub fn build(mut self) -> Result<Scheduler, StartError> {
        info!(
            "Building pipeline with {} blocks and {} connections",
            self.blocks.len(),
            self.connections.len()
        );

        let mut scheduler = Scheduler::new(self.watchdog);
        if let Some(watchdog) = scheduler.watchdog() {
            for block in &mut self.blocks {
                block.set_watchdog(watchdog.clone());
            }
        }

        // Phase 1: prepare everything on this thread
        let mut prepared = Vec::with_capacity(self.blocks.len());
        for block in &mut self.blocks {
            prepared.push(block.prepare()?);
        }

        // Phase 2: launch. Roots are the blocks a stop request is delivered
        // to; everything downstream stops through ordered shutdown.
        for (id, (mut block, (worker, io))) in self.blocks.drain(..).zip(prepared).enumerate() {
            let root = self.external_inputs.contains(&id) || block.consumer().is_none();
            debug!("Launching block {}: {} (root: {})", id, block.name(), root);
            block.launch(worker, io, scheduler.completion_sender())?;
            scheduler.push(block, root);
        }

        info!(
            "Pipeline built successfully with {} threads",
            scheduler.num_threads()
        );
        Ok(scheduler)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

//! Error types for the runtime system

/// Error type for wiring operations
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Block '{0}' not found")]
    BlockNotFound(String),

    #[error("Block '{0}' already exists")]
    DuplicateBlock(String),

    #[error("Block '{0}' has no producer role")]
    NotAProducer(String),

    #[error("Block '{0}' has no consumer role")]
    NotAConsumer(String),

    #[error("Block '{block}' is a {actual:?} producer, expected {expected:?}")]
    ProducerKindMismatch {
        block: String,
        expected: super::block::ProducerKind,
        actual: super::block::ProducerKind,
    },

    #[error("Producer '{0}' needs at least one consumer")]
    NoConsumers(String),

    #[error("Block '{0}' cannot be connected to itself")]
    SelfConnection(String),

    #[error("{0}")]
    AlreadyConnected(String),

    #[error("Block '{0}' is already running, wiring must happen before start")]
    AlreadyStarted(String),
}

/// Error type for block startup
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("Failed to create transform plan for '{block}': {reason}")]
    PlanCreationFailure { block: String, reason: String },

    #[error("Block '{block}' is missing its {side} connection")]
    NotWired { block: String, side: &'static str },

    #[error("Block '{0}' has already been started")]
    AlreadyStarted(String),

    #[error("Failed to spawn thread for '{block}': {source}")]
    Spawn {
        block: String,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for work function operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkError {
    /// Shutdown was signaled and the remaining data is below the requested size.
    #[error("End of stream")]
    EndOfStream,

    #[error("Ring buffer has been shut down")]
    RingShutdown,

    #[error("Block-specific error: {0}")]
    BlockError(String),
}

/// Result type for work functions
pub type WorkResult<T = ()> = Result<T, WorkError>;

//! Error types for the decode runtime

/// Error reported by a decode engine or one of its decoder instances
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown decoder '{0}'")]
    UnknownDecoder(String),

    #[error("Decoder '{decoder}' is missing channel '{channel}'")]
    MissingChannel { decoder: String, channel: String },

    #[error("Invalid value for option '{option}' of decoder '{decoder}': {reason}")]
    InvalidOption {
        decoder: String,
        option: String,
        reason: String,
    },

    #[error("Unknown decoder instance {0}")]
    UnknownInstance(usize),

    #[error("Session has not been started")]
    NotStarted,

    #[error("Session has already been started")]
    AlreadyStarted,

    #[error("Samples out of order: expected chunk at {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    #[error("Chunk size mismatch: expected {expected} bytes, got {got}")]
    ChunkSize { expected: usize, got: usize },

    #[error("{0}")]
    Decoder(String),
}

/// Terminal error latched by a decode run
///
/// The `Display` text is what `DecoderStack::error_message()` reports.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("One or more required channels have not been specified")]
    MissingChannels,

    #[error("Failed to create decoder instance: {0}")]
    Instance(EngineError),

    #[error("Failed to start decode session: {0}")]
    Session(EngineError),

    #[error("Decoder reported an error: {0}")]
    Submission(EngineError),

    #[error("Failed to spawn decode thread: {0}")]
    Spawn(#[from] std::io::Error),
}

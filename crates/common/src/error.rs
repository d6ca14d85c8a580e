use thiserror::Error;

/// Top-level error type for the transcription worker.
///
/// Variants map onto the error taxonomy: transient vs. logical store
/// errors, provider/conferencing failures, and the handful of
/// operational errors every component can raise.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Network blip, serialization conflict, connection drop — retry on
    /// the next tick, never crash the process.
    #[error("transient store error: {0}")]
    StoreTransient(String),

    /// Missing required config row or misconfigured dependency —
    /// release the claim, back off, retry later.
    #[error("logical store error: {0}")]
    StoreLogical(String),

    #[error("transcription provider protocol error: {0}")]
    Provider(String),

    #[error("conferencing session error: {0}")]
    Conference(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

impl WorkerError {
    /// Whether the caller should simply retry on the next tick rather
    /// than unwind the room loop.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreTransient(_))
    }

    /// Whether this warrants abandoning the current room iteration
    /// (release the claim, back off, retry a claim later).
    pub fn is_logical(&self) -> bool {
        matches!(self, Self::StoreLogical(_) | Self::Config(_))
    }
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

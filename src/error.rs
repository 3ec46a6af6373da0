//! Error types for the Krishi Mitra voice core.

/// Top-level error type for locale resolution and voice dialogue.
#[derive(Debug, thiserror::Error)]
pub enum KrishiError {
    /// The host provides no speech recognition or synthesis engine.
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// One locale signal source failed; the resolver moves on to the next.
    #[error("locale source unavailable: {0}")]
    SourceUnavailable(String),

    /// Speech recognition failed mid-listen. Retryable.
    #[error("recognition fault: {0}")]
    RecognitionFault(String),

    /// Speech synthesis failed.
    #[error("synthesis fault: {0}")]
    SynthesisFault(String),

    /// The speech transport misbehaved in a way the controller cannot recover
    /// from without a reset.
    #[error("transport fault: {0}")]
    TransportFault(String),

    /// A dialogue turn is already in progress.
    #[error("dialogue busy: {0}")]
    Busy(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Host contract violation (bad envelope, missing payload field).
    #[error("contract error: {0}")]
    Contract(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, KrishiError>;

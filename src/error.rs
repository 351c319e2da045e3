use thiserror::Error;

/// Failure modes of starting a transcoder. None of these leave anything
/// registered; the next request for the same key retries from scratch.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The channel's invocation or launch plan is malformed.
    #[error("invalid transcoder configuration: {0}")]
    Configuration(String),

    /// The source handler failed to produce a playable URL.
    #[error("source resolution failed: {0}")]
    Resolution(String),

    /// The OS refused to create the process (or its scratch directory).
    #[error("failed to launch transcoder: {0}")]
    Spawn(#[from] std::io::Error),
}

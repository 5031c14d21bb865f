//! Error types for stream operations
//!
//! Every failure path in the stream core ends in exactly one of these
//! variants being delivered to the consumer's error callback, with the
//! single documented exception of `SchedulerUnavailable`, which is dropped
//! silently because its target context no longer exists.

/// Main error type for stream operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// A stream was built from a missing or already-consumed source
    #[error("Stream source is missing or already consumed")]
    InvalidSource,

    /// A user-supplied transform or predicate failed during evaluation
    #[error("Operator failure: {0}")]
    OperatorFailure(String),

    /// An error signal propagated verbatim from an upstream stream
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The target execution context was torn down before delivery
    #[error("Scheduler target context is gone")]
    SchedulerUnavailable,

    /// Custom error with message
    #[error("Stream error: {0}")]
    Custom(String),
}

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            StreamError::OperatorFailure("bad map".into()).to_string(),
            "Operator failure: bad map"
        );
        assert_eq!(
            StreamError::InvalidSource.to_string(),
            "Stream source is missing or already consumed"
        );
    }
}

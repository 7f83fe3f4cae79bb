use bridge::QueueUnavailable;
use thiserror::Error;

/// Ways a client payload can be malformed. None of them end the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("empty frame")]
    EmptyFrame,

    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("text messages are not accepted")]
    UnexpectedText,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("Client protocol error: {0}")]
    ClientProtocol(#[from] ProtocolViolation),

    #[error("Frame dropped: {inflight} jobs in flight (limit {limit})")]
    Backpressure { inflight: usize, limit: usize },

    #[error("Frame dropped: {0}")]
    QueueUnavailable(#[from] QueueUnavailable),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl SessionError {
    /// Whether the frame was refused for load reasons rather than content.
    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            SessionError::Backpressure { .. } | SessionError::QueueUnavailable(_)
        )
    }
}

//! Error taxonomy of the streaming decoder.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A frame looked like a structured result but was not one. Non-fatal.
    #[error("protocol parse error: {0}")]
    ProtocolParse(String),

    /// Connection dropped or never established.
    #[error("transport error: {0}")]
    Transport(String),

    /// The agent reported that the query failed.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    /// A durable write failed. In-memory state stays authoritative.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A new turn was requested while the bound answer is still streaming.
    #[error("turn already in progress for message {0}")]
    TurnInProgress(String),

    #[error("frame queue closed")]
    QueueClosed,
}

pub type StreamResult<T> = Result<T, StreamError>;

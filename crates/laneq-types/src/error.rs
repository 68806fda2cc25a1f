//! Error types for LaneQ
//!
//! Every failure in the broker is returned to the caller that triggered it.

use thiserror::Error;

use crate::state::State;

/// Main error type for LaneQ operations
#[derive(Error, Debug)]
pub enum Error {
    /// Operation attempted in a lifecycle state that does not allow it
    #[error("Wrong state: {0}")]
    WrongState(State),

    /// Topic already registered in the queue
    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),

    /// Topic not registered in the queue
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// Lane stayed full for the whole publish timeout
    #[error("Publish timed out on topic: {0}")]
    PublishTimeout(String),

    /// No reply arrived within the wait timeout
    #[error("Wait timed out")]
    WaitTimeout,

    /// Message was acquired without a reply slot or callback
    #[error("No way to reply")]
    NoReplyPath,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for LaneQ operations
pub type Result<T> = std::result::Result<T, Error>;

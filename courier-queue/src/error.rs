//! Error types for the courier-queue crate.

use thiserror::Error;

use crate::Location;

/// Top-level broker error type.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The topic already holds its configured maximum number of records.
    #[error("Topic {topic} capacity exceeded: {capacity} records")]
    CapacityExceeded { topic: String, capacity: usize },

    /// A record was acknowledged or released without being handed out first.
    #[error("Record {location} is not in flight for group {group}")]
    NotInFlight { group: String, location: Location },

    /// No record exists at the given location.
    #[error("Record not found: {0}")]
    NotFound(Location),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// The broker refused the operation (outage, fault injection).
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

impl QueueError {
    /// Returns `true` if retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::CapacityExceeded { .. })
    }
}

/// Specialized `Result` type for broker operations.
pub type Result<T> = std::result::Result<T, QueueError>;

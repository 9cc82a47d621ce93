//! Wire encoding for record payloads.
//!
//! Payloads are serde types encoded with bincode's standard configuration, the
//! same encoding on both ends of every topic.

use serde::{Serialize, de::DeserializeOwned};

use crate::{Result, SerializationError};

/// Encode a value for publishing.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| SerializationError::from(e).into())
}

/// Decode a record payload.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    bincode::serde::decode_from_slice(payload, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| SerializationError::from(e).into())
}

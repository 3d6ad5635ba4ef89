//! Pluggable serialization for cache payloads.
//!
//! Cache call sites never name a wire format; they go through a
//! [`Serializer`] so a binary-efficient codec can replace JSON without
//! touching the components.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CoordinationError, Result};

/// Encode/decode strategy for cached values.
pub trait Serializer: Send + Sync {
    /// Encode a value to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Serialization`] if encoding fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode a value from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Serialization`] if the payload is
    /// corrupt or the wrong shape.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON codec. Default: human-readable, schema-tolerant.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CoordinationError::Serialization(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| CoordinationError::Serialization(e.to_string()))
    }
}

/// Bincode codec for compact binary payloads.
///
/// Not self-describing: both sides must agree on the type. Unsuitable for
/// payloads containing `serde_json::Value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| CoordinationError::Serialization(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| CoordinationError::Serialization(e.to_string()))
    }
}

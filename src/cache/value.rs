//! Cache Payload Module
//!
//! Defines the envelope stored for every cache entry: the serialized value
//! plus a runtime type tag. The engine never interprets the payload bytes
//! beyond this envelope; serialization is a pluggable concern confined here.

use std::any::type_name;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// == Cache Payload ==
/// Serialized value plus the tag of the type it was encoded from.
///
/// The tag guards retrieval: asking for a different type than the one that
/// was stored is reported as "no value" rather than handing back bytes that
/// would decode into the wrong shape. A tag match with undecodable bytes is
/// a real serialization error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePayload {
    /// Runtime tag of the stored type
    pub type_tag: String,
    /// Serialized value bytes
    pub bytes: Vec<u8>,
}

impl CachePayload {
    // == Typed Encode ==
    /// Encodes a typed value, tagging it with the type's name.
    pub fn encode<T>(value: &T) -> Result<Self>
    where
        T: Serialize + 'static,
    {
        Ok(Self {
            type_tag: type_name::<T>().to_string(),
            bytes: serde_json::to_vec(value)?,
        })
    }

    // == Typed Decode ==
    /// Decodes the payload as `T`.
    ///
    /// # Returns
    /// - `Ok(Some(value))` when the tag matches and the bytes decode
    /// - `Ok(None)` when the stored tag does not match `T` (treated by
    ///   callers as a miss, not an error)
    /// - `Err` when the tag matches but the bytes cannot be decoded
    pub fn decode<T>(&self) -> Result<Option<T>>
    where
        T: DeserializeOwned + 'static,
    {
        if self.type_tag != type_name::<T>() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&self.bytes)?))
    }

    // == Untyped Encode ==
    /// Encodes an untyped value under an explicit caller-supplied tag.
    pub fn encode_value(type_tag: &str, value: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            type_tag: type_tag.to_string(),
            bytes: serde_json::to_vec(value)?,
        })
    }

    // == Untyped Decode ==
    /// Decodes the payload as an untyped value, guarded by an explicit tag.
    ///
    /// Same contract as [`CachePayload::decode`]: a tag mismatch is
    /// `Ok(None)`, undecodable bytes are an error.
    pub fn decode_value(&self, type_tag: &str) -> Result<Option<serde_json::Value>> {
        if self.type_tag != type_tag {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&self.bytes)?))
    }

    // == Wire Form ==
    /// Serializes the whole envelope for stores that hold raw bytes.
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserializes an envelope previously produced by [`CachePayload::to_wire`].
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

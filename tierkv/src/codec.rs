//! Codecs
//!
//! A namespace converts values to and from disk payloads through a serializer/deserializer
//! pair. Both halves are strategy objects so either can be swapped independently at runtime.
//! - [`BincodeCodec`]: compact binary encoding (default)
//! - [`JsonCodec`]: human-readable payloads

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::CodecError;

/// Converts a value into the bytes written to disk
pub trait Serializer<V>: Send + Sync {
    fn serialize(&self, value: &V) -> Result<Vec<u8>, CodecError>;
}

/// Converts bytes read from disk back into a value
pub trait Deserializer<V>: Send + Sync {
    fn deserialize(&self, bytes: &[u8]) -> Result<V, CodecError>;
}

/// Bincode (standard config) over serde
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<V: Serialize> Serializer<V> for BincodeCodec {
    fn serialize(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        Ok(bincode::serde::encode_to_vec(
            value,
            bincode::config::standard(),
        )?)
    }
}

impl<V: DeserializeOwned> Deserializer<V> for BincodeCodec {
    fn deserialize(&self, bytes: &[u8]) -> Result<V, CodecError> {
        let (value, read) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        if read != bytes.len() {
            return Err(CodecError::Custom(format!(
                "{} trailing bytes after payload",
                bytes.len() - read
            )));
        }
        Ok(value)
    }
}

/// JSON over serde
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<V: Serialize> Serializer<V> for JsonCodec {
    fn serialize(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }
}

impl<V: DeserializeOwned> Deserializer<V> for JsonCodec {
    fn deserialize(&self, bytes: &[u8]) -> Result<V, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Codec selectable from configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Bincode,
    Json,
}

impl CodecKind {
    pub fn serializer<V: Serialize + 'static>(self) -> Arc<dyn Serializer<V>> {
        match self {
            Self::Bincode => Arc::new(BincodeCodec),
            Self::Json => Arc::new(JsonCodec),
        }
    }

    pub fn deserializer<V: DeserializeOwned + 'static>(self) -> Arc<dyn Deserializer<V>> {
        match self {
            Self::Bincode => Arc::new(BincodeCodec),
            Self::Json => Arc::new(JsonCodec),
        }
    }
}

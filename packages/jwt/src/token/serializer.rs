use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Encoding of the header and claims segments.
///
/// Encoding failures are internal errors; decoding failures mean the token
/// is malformed.
pub trait Serializer: Send + Sync {
    /// Encode `value` to bytes.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode bytes produced by [`Serializer::serialize`].
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON segments, the JWS default.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::internal(format!("json encode ({e})")))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| Error::malformed(format!("json ({e})")))
    }
}

/// Compact binary segments.
///
/// The format is not self-describing: claim types that skip fields while
/// serializing, or that hold untyped JSON values, cannot be decoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| Error::internal(format!("bincode encode ({e})")))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let (value, read) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| Error::malformed(format!("bincode ({e})")))?;
        if read != bytes.len() {
            return Err(Error::malformed("bincode (trailing bytes)"));
        }
        Ok(value)
    }
}

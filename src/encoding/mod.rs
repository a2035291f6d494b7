//! Wire message encoding.
//!
//! Messages are JSON documents framed with a big-endian u64 length prefix,
//! see the [`json`] module documentation.

pub mod json;

use crate::error::Result;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A wire message, encoded as length-framed JSON.
pub trait Message: Serialize + DeserializeOwned {
    /// Encodes the message into a writer, prefixed by its length.
    fn encode_into<W: std::io::Write>(&self, writer: W) -> Result<()> {
        json::serialize_into(writer, self)
    }

    /// Decodes a message from a reader.
    fn decode_from<R: std::io::Read>(reader: R) -> Result<Self> {
        json::deserialize_from(reader)
    }

    /// Decodes a message from a reader, or returns None if the connection was
    /// closed before a message began.
    fn maybe_decode_from<R: std::io::Read>(reader: R) -> Result<Option<Self>> {
        json::maybe_deserialize_from(reader)
    }
}

impl Message for serde_json::Value {}

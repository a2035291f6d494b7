//! JSON is used to encode all wire messages, both between chain replicas and
//! with clients. It is self-describing and language-independent, which is
//! sufficient here. Messages are framed on the wire as:
//!
//! ```text
//! -------------------------------------------------------------
//! | message length (u64 big-endian) | message (UTF-8 JSON)    |
//! -------------------------------------------------------------
//! ```

use crate::error::Result;

/// Serializes a value into a writer as a length-framed JSON message.
pub fn serialize_into<W: std::io::Write, T: serde::Serialize>(
    mut writer: W,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    writer.write_all(&(bytes.len() as u64).to_be_bytes())?;
    writer.write_all(&bytes)?;
    Ok(())
}

/// Deserializes a length-framed JSON message from a reader.
pub fn deserialize_from<R: std::io::Read, T: serde::de::DeserializeOwned>(
    mut reader: R,
) -> Result<T> {
    let mut len = [0; 8];
    reader.read_exact(&mut len)?;
    let mut bytes = vec![0; u64::from_be_bytes(len) as usize];
    reader.read_exact(&mut bytes)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Deserializes a length-framed JSON message from a reader, or returns None
/// if the connection was closed before a length prefix arrived.
pub fn maybe_deserialize_from<R: std::io::Read, T: serde::de::DeserializeOwned>(
    mut reader: R,
) -> Result<Option<T>> {
    let mut len = [0; 8];
    if let Err(err) = reader.read_exact(&mut len) {
        return match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Ok(None),
            std::io::ErrorKind::ConnectionReset => Ok(None),
            _ => Err(err.into()),
        };
    }
    let mut bytes = vec![0; u64::from_be_bytes(len) as usize];
    reader.read_exact(&mut bytes)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

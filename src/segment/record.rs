//! Record codec
//!
//! Encodes `(key, value)` pairs into length-prefixed frames and decodes
//! a single frame back from a positioned reader.

use std::io::{self, Read};
use std::path::Path;

use bytes::{BufMut, BytesMut};

use crate::error::{KvError, Result};

use super::LEN_PREFIX_SIZE;

/// A single key/value record as stored in a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Size of the encoded frame in bytes
    pub fn encoded_len(key: &str, value: &str) -> u64 {
        2 * LEN_PREFIX_SIZE + key.len() as u64 + value.len() as u64
    }

    /// Encode a frame: [key_len(4)][key][value_len(4)][value]
    pub fn encode(key: &str, value: &str) -> Result<BytesMut> {
        let key_len = field_len(key)?;
        let value_len = field_len(value)?;

        let mut buf = BytesMut::with_capacity(Self::encoded_len(key, value) as usize);
        buf.put_u32_le(key_len);
        buf.put_slice(key.as_bytes());
        buf.put_u32_le(value_len);
        buf.put_slice(value.as_bytes());
        Ok(buf)
    }

    /// Decode exactly one frame from `reader`, which must be positioned at
    /// `offset`. `limit` is the end of the valid region of the segment:
    /// a frame reaching past it is corrupt.
    pub fn decode_at<R: Read>(reader: &mut R, path: &Path, offset: u64, limit: u64) -> Result<Self> {
        let mut pos = offset;

        let key_len = read_len(reader, path, offset)? as u64;
        pos += LEN_PREFIX_SIZE;
        if pos + key_len + LEN_PREFIX_SIZE > limit {
            return Err(KvError::corrupt(
                path,
                offset,
                format!("key length {} runs past segment end {}", key_len, limit),
            ));
        }
        let key = read_string(reader, key_len as usize, path, offset, "key")?;
        pos += key_len;

        let value_len = read_len(reader, path, offset)? as u64;
        pos += LEN_PREFIX_SIZE;
        if pos + value_len > limit {
            return Err(KvError::corrupt(
                path,
                offset,
                format!("value length {} runs past segment end {}", value_len, limit),
            ));
        }
        let value = read_string(reader, value_len as usize, path, offset, "value")?;

        Ok(Self { key, value })
    }
}

fn field_len(field: &str) -> Result<u32> {
    u32::try_from(field.len()).map_err(|_| KvError::RecordTooLarge { len: field.len() })
}

fn read_len<R: Read>(reader: &mut R, path: &Path, offset: u64) -> Result<u32> {
    let mut buf = [0u8; LEN_PREFIX_SIZE as usize];
    reader
        .read_exact(&mut buf)
        .map_err(|e| truncated_or_io(e, path, offset))?;
    Ok(u32::from_le_bytes(buf))
}

fn read_string<R: Read>(
    reader: &mut R,
    len: usize,
    path: &Path,
    offset: u64,
    field: &str,
) -> Result<String> {
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|e| truncated_or_io(e, path, offset))?;
    String::from_utf8(buf)
        .map_err(|_| KvError::corrupt(path, offset, format!("{} is not valid UTF-8", field)))
}

fn truncated_or_io(err: io::Error, path: &Path, offset: u64) -> KvError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        KvError::corrupt(path, offset, "record truncated")
    } else {
        KvError::Io(err)
    }
}

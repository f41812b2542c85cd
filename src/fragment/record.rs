//! TLS record header
//!
//! Fixed 5-byte layout: content type (1), protocol version (2, big-endian),
//! fragment length (2, big-endian).

use crate::constants::{TLS_CONTENT_TYPE_HANDSHAKE, TLS_RECORD_HEADER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: u8,
    pub version: u16,
    pub length: u16,
}

impl RecordHeader {
    /// Read a header from the start of `data`, if at least 5 bytes are present
    pub fn parse(data: &[u8]) -> Option<Self> {
        let header = data.get(..TLS_RECORD_HEADER_SIZE)?;
        Some(Self {
            content_type: header[0],
            version: u16::from_be_bytes([header[1], header[2]]),
            length: u16::from_be_bytes([header[3], header[4]]),
        })
    }

    /// Header for a record of `length` bytes with the same type and version
    pub fn with_length(&self, length: u16) -> Self {
        Self { length, ..*self }
    }

    pub fn is_handshake(&self) -> bool {
        self.content_type == TLS_CONTENT_TYPE_HANDSHAKE
    }

    /// Total record size, header included
    pub fn record_len(&self) -> usize {
        TLS_RECORD_HEADER_SIZE + usize::from(self.length)
    }

    pub fn to_bytes(&self) -> [u8; TLS_RECORD_HEADER_SIZE] {
        let [v0, v1] = self.version.to_be_bytes();
        let [l0, l1] = self.length.to_be_bytes();
        [self.content_type, v0, v1, l0, l1]
    }

    /// Serialize this header followed by `payload` into one record.
    ///
    /// The caller keeps `payload.len()` equal to `self.length`.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut record = Vec::with_capacity(TLS_RECORD_HEADER_SIZE + payload.len());
        record.extend_from_slice(&self.to_bytes());
        record.extend_from_slice(payload);
        record
    }
}

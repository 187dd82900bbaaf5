//! Demultiplexed access units handed to the decoder.

use std::fmt::Debug;

use bytes::Bytes;

use crate::header::PacketHeader;

/// One decodable unit of the elementary stream.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    data: Bytes,
    pts: Option<u64>,
    key_frame: bool,
}

impl Packet {
    pub fn new(data: Bytes, pts: Option<u64>, key_frame: bool) -> Self {
        Self {
            data,
            pts,
            key_frame,
        }
    }

    pub fn from_header(header: &PacketHeader, data: Bytes) -> Self {
        Self::new(data, header.pts(), header.is_key_frame())
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn pts(&self) -> Option<u64> {
        self.pts
    }

    /// Always equal to the presentation timestamp in this protocol.
    pub fn dts(&self) -> Option<u64> {
        self.pts
    }

    pub fn is_key_frame(&self) -> bool {
        self.key_frame
    }

    /// Codec configuration data carries no timestamp.
    pub fn is_config(&self) -> bool {
        self.pts.is_none()
    }

    /// Prepend `prefix` to the payload.
    pub(crate) fn prepend(&mut self, prefix: &[u8]) {
        let mut merged = Vec::with_capacity(prefix.len() + self.data.len());
        merged.extend_from_slice(prefix);
        merged.extend_from_slice(&self.data);
        self.data = Bytes::from(merged);
    }
}

impl Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("len", &self.data.len())
            .field("pts", &self.pts)
            .field("key_frame", &self.key_frame)
            .finish()
    }
}

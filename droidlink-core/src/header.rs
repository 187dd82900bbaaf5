//! The 12-byte header that precedes every media packet.
//!
//! ```text
//! pts_flags: u64 BE   bit 63 = config, bit 62 = key frame, bits 0..62 = pts
//! length:    u32 BE   payload size, never zero
//! ```

use crate::buffer::{read32be, read64be};

pub const PACKET_HEADER_SIZE: usize = 12;

pub const PACKET_FLAG_CONFIG: u64 = 1 << 63;
pub const PACKET_FLAG_KEY_FRAME: u64 = 1 << 62;
pub const PACKET_PTS_MASK: u64 = PACKET_FLAG_KEY_FRAME - 1;

pub type PacketHeaderBytes = [u8; PACKET_HEADER_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pts_flags: u64,
    length: u32,
}

impl PacketHeader {
    pub fn new(pts_flags: u64, length: u32) -> Self {
        Self { pts_flags, length }
    }

    /// Header for a configuration packet (no timestamp).
    pub fn config(length: u32) -> Self {
        Self::new(PACKET_FLAG_CONFIG, length)
    }

    /// Header for a media packet.
    pub fn media(pts: u64, key_frame: bool, length: u32) -> Self {
        let mut pts_flags = pts & PACKET_PTS_MASK;
        if key_frame {
            pts_flags |= PACKET_FLAG_KEY_FRAME;
        }
        Self::new(pts_flags, length)
    }

    pub fn from_bytes(bytes: &PacketHeaderBytes) -> Self {
        // a fixed-size array always holds both fields
        Self {
            pts_flags: read64be(bytes, 0).unwrap_or_default(),
            length: read32be(bytes, 8).unwrap_or_default(),
        }
    }

    pub fn to_bytes(&self) -> PacketHeaderBytes {
        let mut bytes = [0u8; PACKET_HEADER_SIZE];
        bytes[0..8].copy_from_slice(&self.pts_flags.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }

    pub fn pts_flags(&self) -> u64 {
        self.pts_flags
    }

    pub fn is_config(&self) -> bool {
        self.pts_flags & PACKET_FLAG_CONFIG != 0
    }

    pub fn is_key_frame(&self) -> bool {
        self.pts_flags & PACKET_FLAG_KEY_FRAME != 0
    }

    /// Presentation timestamp in microseconds; `None` for config packets.
    pub fn pts(&self) -> Option<u64> {
        if self.is_config() {
            None
        } else {
            Some(self.pts_flags & PACKET_PTS_MASK)
        }
    }

    pub fn payload_length(&self) -> u32 {
        self.length
    }
}

//! Inbound device messages (device → client).
//!
//! ```text
//! CLIPBOARD      0x00  length:u32  text:[u8; length]
//! ACK_CLIPBOARD  0x01  sequence:u64
//! ```

use std::borrow::Cow;

use bytes::Bytes;

use crate::buffer::{read32be, read64be};
use crate::error::DeserializeError;

// ── Constants ────────────────────────────────────────────────────

/// Largest device message; the receive buffer never grows past this.
pub const DEVICE_MSG_MAX_SIZE: usize = 1 << 18;

/// tag(1) + length(4)
pub const DEVICE_MSG_TEXT_MAX_LENGTH: usize = DEVICE_MSG_MAX_SIZE - 5;

/// Shortest prefix that can be inspected.
const MIN_HEADER_LEN: usize = 5;

// ── DeviceMessageType ────────────────────────────────────────────

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceMessageType {
    Clipboard = 0,
    AckClipboard = 1,
}

impl TryFrom<u8> for DeviceMessageType {
    type Error = DeserializeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceMessageType::Clipboard),
            1 => Ok(DeviceMessageType::AckClipboard),
            _ => Err(DeserializeError::NotRecoverable),
        }
    }
}

// ── DeviceMessage ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    /// The device clipboard changed (or was requested).
    Clipboard { text: Bytes },
    /// The device applied a `SetClipboard` with this sequence number.
    AckClipboard { sequence: u64 },
}

impl DeviceMessage {
    pub fn message_type(&self) -> DeviceMessageType {
        match self {
            DeviceMessage::Clipboard { .. } => DeviceMessageType::Clipboard,
            DeviceMessage::AckClipboard { .. } => DeviceMessageType::AckClipboard,
        }
    }

    /// Clipboard text, lossily decoded. `None` for other messages.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            DeviceMessage::Clipboard { text } => Some(String::from_utf8_lossy(text)),
            DeviceMessage::AckClipboard { .. } => None,
        }
    }
}

/// Parse one message starting at `buf[start..]`.
///
/// On success returns the message and the number of bytes it occupied.
/// `NotAvailable` means the caller must keep the bytes and read more;
/// `NotRecoverable` means the stream cannot be resynchronised.
pub fn deserialize(buf: &[u8], start: usize) -> Result<(DeviceMessage, usize), DeserializeError> {
    let data = buf.get(start..).unwrap_or_default();
    if data.len() < MIN_HEADER_LEN {
        return Err(DeserializeError::NotAvailable);
    }

    match DeviceMessageType::try_from(data[0])? {
        DeviceMessageType::Clipboard => {
            let len = read32be(data, 1).ok_or(DeserializeError::NotAvailable)? as usize;
            if len > DEVICE_MSG_TEXT_MAX_LENGTH {
                return Err(DeserializeError::NotRecoverable);
            }
            let end = MIN_HEADER_LEN + len;
            if data.len() < end {
                return Err(DeserializeError::NotAvailable);
            }
            let text = Bytes::copy_from_slice(&data[MIN_HEADER_LEN..end]);
            Ok((DeviceMessage::Clipboard { text }, end))
        }
        DeviceMessageType::AckClipboard => {
            let sequence = read64be(data, 1).ok_or(DeserializeError::NotAvailable)?;
            Ok((DeviceMessage::AckClipboard { sequence }, 9))
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_clipboard() {
        let input = b"\x00\x00\x00\x00\x03ABC";
        let (msg, consumed) = deserialize(input, 0).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(msg.message_type(), DeviceMessageType::Clipboard);
        assert_eq!(msg.text().unwrap(), "ABC");
    }

    #[test]
    fn deserialize_clipboard_at_limit() {
        let mut input = b"\x00\x00\x03\xff\xfb".to_vec();
        input.extend(std::iter::repeat_n(b'a', DEVICE_MSG_TEXT_MAX_LENGTH));
        let (msg, consumed) = deserialize(&input, 0).unwrap();
        assert_eq!(consumed, DEVICE_MSG_MAX_SIZE);
        assert!(matches!(
            msg,
            DeviceMessage::Clipboard { ref text } if text.len() == DEVICE_MSG_TEXT_MAX_LENGTH
        ));
    }

    #[test]
    fn deserialize_ack_clipboard() {
        let input = b"\x01\x01\x02\x03\x04\x05\x06\x07\x08";
        let (msg, consumed) = deserialize(input, 0).unwrap();
        assert_eq!(consumed, 9);
        assert_eq!(
            msg,
            DeviceMessage::AckClipboard {
                sequence: 0x0102030405060708
            }
        );
        assert!(msg.text().is_none());
    }

    #[test]
    fn deserialize_from_offset() {
        let input = b"junk\x01\x00\x00\x00\x00\x00\x00\x00\x2a";
        let (msg, consumed) = deserialize(input, 4).unwrap();
        assert_eq!(consumed, 9);
        assert_eq!(msg, DeviceMessage::AckClipboard { sequence: 42 });
    }

    #[test]
    fn short_header_is_not_available() {
        assert_eq!(deserialize(b"", 0), Err(DeserializeError::NotAvailable));
        assert_eq!(deserialize(b"\x00\x00\x00\x00", 0), Err(DeserializeError::NotAvailable));
        assert_eq!(deserialize(b"\x00\x00", 5), Err(DeserializeError::NotAvailable));
    }

    #[test]
    fn partial_payload_is_not_available() {
        assert_eq!(
            deserialize(b"\x00\x00\x00\x00\x03AB", 0),
            Err(DeserializeError::NotAvailable)
        );
        assert_eq!(
            deserialize(b"\x01\x00\x00\x00\x00\x00", 0),
            Err(DeserializeError::NotAvailable)
        );
    }

    #[test]
    fn unknown_tag_is_not_recoverable() {
        assert_eq!(
            deserialize(b"\x07\x00\x00\x00\x00", 0),
            Err(DeserializeError::NotRecoverable)
        );
    }

    #[test]
    fn oversized_clipboard_is_not_recoverable() {
        assert_eq!(
            deserialize(b"\x00\x00\x04\x00\x00", 0),
            Err(DeserializeError::NotRecoverable)
        );
    }
}

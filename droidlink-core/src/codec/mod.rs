//! `tokio_util` framing for the control socket.
//!
//! [`ControlMessageEncoder`] writes outbound commands and
//! [`DeviceMessageDecoder`] extracts inbound events from the read buffer,
//! keeping partial messages buffered between reads.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::control::ControlMessage;
use crate::device::{self, DEVICE_MSG_MAX_SIZE, DeviceMessage};
use crate::error::{DeserializeError, DroidlinkError};

// ── Encoder ──────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct ControlMessageEncoder;

impl Encoder<ControlMessage> for ControlMessageEncoder {
    type Error = DroidlinkError;

    fn encode(&mut self, item: ControlMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.serialize_into(dst);
        Ok(())
    }
}

// ── Decoder ──────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceMessageDecoder;

impl Decoder for DeviceMessageDecoder {
    type Item = DeviceMessage;
    type Error = DroidlinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match device::deserialize(src, 0) {
            Ok((message, consumed)) => {
                src.advance(consumed);
                Ok(Some(message))
            }
            Err(DeserializeError::NotAvailable) => {
                // A full buffer that still holds no complete message can
                // never make progress.
                if src.len() >= DEVICE_MSG_MAX_SIZE {
                    return Err(DroidlinkError::MessageTooLarge {
                        size: src.len(),
                        max: DEVICE_MSG_MAX_SIZE,
                    });
                }
                Ok(None)
            }
            Err(e @ DeserializeError::NotRecoverable) => Err(e.into()),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(message) => Ok(Some(message)),
            None => {
                if !buf.is_empty() {
                    debug!(bytes = buf.len(), "discarding partial device message at end of stream");
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Outbound control messages (client → device).
//!
//! Every message is a 1-byte type tag followed by a fixed payload.
//! All integers are big-endian.
//!
//! | Tag | Message                   | Payload                                             |
//! |-----|---------------------------|-----------------------------------------------------|
//! | 0   | `InjectKeycode`           | action u8, keycode u32, repeat u32, meta u32        |
//! | 1   | `InjectText`              | u32 length + text (≤ 300 bytes)                     |
//! | 2   | `InjectTouchEvent`        | action u8, pointer u64, position, pressure u16, buttons u32 |
//! | 3   | `InjectScrollEvent`       | position, hscroll i32, vscroll i32, buttons u32     |
//! | 4   | `BackOrScreenOn`          | action u8                                           |
//! | 5–7 | panels                    | (none)                                              |
//! | 8   | `GetClipboard`            | copy key u8                                         |
//! | 9   | `SetClipboard`            | sequence u64, paste u8, u32 length + text           |
//! | 10  | `SetScreenPowerMode`      | mode u8                                             |
//! | 11  | `RotateDevice`            | (none)                                              |

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::android::{KeyEventAction, Keycode, MetaState, MotionButtons, MotionEventAction};
use crate::buffer::{to_fixed_point_16, write16be, write32be, write64be, write_string};
use crate::coords::Position;
use crate::error::DroidlinkError;

// ── Constants ────────────────────────────────────────────────────

/// Largest control message the device accepts.
pub const CONTROL_MSG_MAX_SIZE: usize = 1 << 18;

pub const INJECT_TEXT_MAX_LENGTH: usize = 300;

/// tag(1) + sequence(8) + paste(1) + length(4)
pub const CLIPBOARD_TEXT_MAX_LENGTH: usize = CONTROL_MSG_MAX_SIZE - 14;

/// Pointer id reserved for the mouse.
pub const POINTER_ID_MOUSE: u64 = u64::MAX;

/// Pointer id reserved for gestures synthesised from non-touch input.
pub const POINTER_ID_VIRTUAL_FINGER: u64 = u64::MAX - 1;

// ── ControlMessageType ───────────────────────────────────────────

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMessageType {
    InjectKeycode = 0,
    InjectText = 1,
    InjectTouchEvent = 2,
    InjectScrollEvent = 3,
    BackOrScreenOn = 4,
    ExpandNotificationPanel = 5,
    ExpandSettingsPanel = 6,
    CollapsePanels = 7,
    GetClipboard = 8,
    SetClipboard = 9,
    SetScreenPowerMode = 10,
    RotateDevice = 11,
}

impl TryFrom<u8> for ControlMessageType {
    type Error = DroidlinkError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ControlMessageType::*;
        Ok(match value {
            0 => InjectKeycode,
            1 => InjectText,
            2 => InjectTouchEvent,
            3 => InjectScrollEvent,
            4 => BackOrScreenOn,
            5 => ExpandNotificationPanel,
            6 => ExpandSettingsPanel,
            7 => CollapsePanels,
            8 => GetClipboard,
            9 => SetClipboard,
            10 => SetScreenPowerMode,
            11 => RotateDevice,
            _ => {
                return Err(DroidlinkError::Other(format!(
                    "unknown control message type {value}"
                )));
            }
        })
    }
}

impl fmt::Display for ControlMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Payload enums ────────────────────────────────────────────────

/// Which key the device should simulate before reading its clipboard.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CopyKey {
    #[default]
    None = 0,
    Copy = 1,
    Cut = 2,
}

/// Display power mode (`SurfaceControl` values).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScreenPowerMode {
    Off = 0,
    Normal = 2,
}

// ── ControlMessage ───────────────────────────────────────────────

/// A command sent from the client to the device.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    InjectKeycode {
        action: KeyEventAction,
        keycode: Keycode,
        repeat: u32,
        meta_state: MetaState,
    },
    InjectText {
        text: String,
    },
    InjectTouchEvent {
        action: MotionEventAction,
        pointer_id: u64,
        position: Position,
        /// In `[0.0, 1.0]`.
        pressure: f32,
        buttons: MotionButtons,
    },
    InjectScrollEvent {
        position: Position,
        hscroll: i32,
        vscroll: i32,
        buttons: MotionButtons,
    },
    BackOrScreenOn {
        action: KeyEventAction,
    },
    ExpandNotificationPanel,
    ExpandSettingsPanel,
    CollapsePanels,
    GetClipboard {
        copy_key: CopyKey,
    },
    SetClipboard {
        sequence: u64,
        text: String,
        paste: bool,
    },
    SetScreenPowerMode {
        mode: ScreenPowerMode,
    },
    RotateDevice,
}

impl ControlMessage {
    /// The 1-byte tag that starts this message on the wire.
    pub fn message_type(&self) -> ControlMessageType {
        match self {
            ControlMessage::InjectKeycode { .. } => ControlMessageType::InjectKeycode,
            ControlMessage::InjectText { .. } => ControlMessageType::InjectText,
            ControlMessage::InjectTouchEvent { .. } => ControlMessageType::InjectTouchEvent,
            ControlMessage::InjectScrollEvent { .. } => ControlMessageType::InjectScrollEvent,
            ControlMessage::BackOrScreenOn { .. } => ControlMessageType::BackOrScreenOn,
            ControlMessage::ExpandNotificationPanel => ControlMessageType::ExpandNotificationPanel,
            ControlMessage::ExpandSettingsPanel => ControlMessageType::ExpandSettingsPanel,
            ControlMessage::CollapsePanels => ControlMessageType::CollapsePanels,
            ControlMessage::GetClipboard { .. } => ControlMessageType::GetClipboard,
            ControlMessage::SetClipboard { .. } => ControlMessageType::SetClipboard,
            ControlMessage::SetScreenPowerMode { .. } => ControlMessageType::SetScreenPowerMode,
            ControlMessage::RotateDevice => ControlMessageType::RotateDevice,
        }
    }

    /// Append the wire encoding of this message to `buf`.
    pub fn serialize_into(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.message_type() as u8);
        match self {
            ControlMessage::InjectKeycode {
                action,
                keycode,
                repeat,
                meta_state,
            } => {
                buf.put_u8(*action as u8);
                write32be(buf, keycode.0);
                write32be(buf, *repeat);
                write32be(buf, meta_state.bits());
            }
            ControlMessage::InjectText { text } => {
                write_string(buf, text.as_bytes(), INJECT_TEXT_MAX_LENGTH);
            }
            ControlMessage::InjectTouchEvent {
                action,
                pointer_id,
                position,
                pressure,
                buttons,
            } => {
                buf.put_u8(*action as u8);
                write64be(buf, *pointer_id);
                position.write(buf);
                write16be(buf, to_fixed_point_16(*pressure));
                write32be(buf, buttons.bits());
            }
            ControlMessage::InjectScrollEvent {
                position,
                hscroll,
                vscroll,
                buttons,
            } => {
                position.write(buf);
                write32be(buf, *hscroll as u32);
                write32be(buf, *vscroll as u32);
                write32be(buf, buttons.bits());
            }
            ControlMessage::BackOrScreenOn { action } => {
                buf.put_u8(*action as u8);
            }
            ControlMessage::GetClipboard { copy_key } => {
                buf.put_u8(*copy_key as u8);
            }
            ControlMessage::SetClipboard {
                sequence,
                text,
                paste,
            } => {
                write64be(buf, *sequence);
                buf.put_u8(*paste as u8);
                write_string(buf, text.as_bytes(), CLIPBOARD_TEXT_MAX_LENGTH);
            }
            ControlMessage::SetScreenPowerMode { mode } => {
                buf.put_u8(*mode as u8);
            }
            ControlMessage::ExpandNotificationPanel
            | ControlMessage::ExpandSettingsPanel
            | ControlMessage::CollapsePanels
            | ControlMessage::RotateDevice => {}
        }
    }

    /// Encode into a fresh buffer.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len_hint());
        self.serialize_into(&mut buf);
        buf.freeze()
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            ControlMessage::InjectText { text } => 5 + text.len().min(INJECT_TEXT_MAX_LENGTH),
            ControlMessage::SetClipboard { text, .. } => {
                14 + text.len().min(CLIPBOARD_TEXT_MAX_LENGTH)
            }
            _ => 32,
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message_type())
    }
}

// ── Tests ────────────────────────────────────────────────────────

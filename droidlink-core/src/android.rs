//! Android input constants (`android/input.h`, `android/keycodes.h`).
//!
//! Only the values the control protocol carries are modelled here.

use std::fmt;

use bitflags::bitflags;

use crate::error::DroidlinkError;

// ── KeyEventAction ───────────────────────────────────────────────

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEventAction {
    Down = 0,
    Up = 1,
    Multiple = 2,
}

impl TryFrom<u8> for KeyEventAction {
    type Error = DroidlinkError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(KeyEventAction::Down),
            1 => Ok(KeyEventAction::Up),
            2 => Ok(KeyEventAction::Multiple),
            _ => Err(DroidlinkError::Other(format!(
                "unknown key event action {value}"
            ))),
        }
    }
}

// ── MotionEventAction ────────────────────────────────────────────

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionEventAction {
    Down = 0,
    Up = 1,
    Move = 2,
    Cancel = 3,
    Outside = 4,
    PointerDown = 5,
    PointerUp = 6,
    HoverMove = 7,
    Scroll = 8,
    HoverEnter = 9,
    HoverExit = 10,
    ButtonPress = 11,
    ButtonRelease = 12,
}

impl TryFrom<u8> for MotionEventAction {
    type Error = DroidlinkError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MotionEventAction::*;
        Ok(match value {
            0 => Down,
            1 => Up,
            2 => Move,
            3 => Cancel,
            4 => Outside,
            5 => PointerDown,
            6 => PointerUp,
            7 => HoverMove,
            8 => Scroll,
            9 => HoverEnter,
            10 => HoverExit,
            11 => ButtonPress,
            12 => ButtonRelease,
            _ => {
                return Err(DroidlinkError::Other(format!(
                    "unknown motion event action {value}"
                )));
            }
        })
    }
}

// ── MetaState / MotionButtons ────────────────────────────────────

bitflags! {
    /// Modifier key state attached to a key event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MetaState: u32 {
        const SHIFT_ON = 0x01;
        const ALT_ON = 0x02;
        const SYM_ON = 0x04;
        const FUNCTION_ON = 0x08;
        const ALT_LEFT_ON = 0x10;
        const ALT_RIGHT_ON = 0x20;
        const SHIFT_LEFT_ON = 0x40;
        const SHIFT_RIGHT_ON = 0x80;
        const CTRL_ON = 0x1000;
        const CTRL_LEFT_ON = 0x2000;
        const CTRL_RIGHT_ON = 0x4000;
        const META_ON = 0x10000;
        const META_LEFT_ON = 0x20000;
        const META_RIGHT_ON = 0x40000;
        const CAPS_LOCK_ON = 0x100000;
        const NUM_LOCK_ON = 0x200000;
        const SCROLL_LOCK_ON = 0x400000;
    }
}

bitflags! {
    /// Buttons held during a motion event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MotionButtons: u32 {
        const PRIMARY = 1 << 0;
        const SECONDARY = 1 << 1;
        const TERTIARY = 1 << 2;
        const BACK = 1 << 3;
        const FORWARD = 1 << 4;
        const STYLUS_PRIMARY = 1 << 5;
        const STYLUS_SECONDARY = 1 << 6;
    }
}

// ── Keycode ──────────────────────────────────────────────────────

/// An Android key code. Any `u32` is accepted on the wire; the
/// associated constants cover the keys a client commonly injects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Keycode(pub u32);

impl Keycode {
    pub const UNKNOWN: Keycode = Keycode(0);
    pub const HOME: Keycode = Keycode(3);
    pub const BACK: Keycode = Keycode(4);
    pub const DPAD_UP: Keycode = Keycode(19);
    pub const DPAD_DOWN: Keycode = Keycode(20);
    pub const DPAD_LEFT: Keycode = Keycode(21);
    pub const DPAD_RIGHT: Keycode = Keycode(22);
    pub const VOLUME_UP: Keycode = Keycode(24);
    pub const VOLUME_DOWN: Keycode = Keycode(25);
    pub const POWER: Keycode = Keycode(26);
    pub const TAB: Keycode = Keycode(61);
    pub const SPACE: Keycode = Keycode(62);
    pub const ENTER: Keycode = Keycode(66);
    pub const DEL: Keycode = Keycode(67);
    pub const MENU: Keycode = Keycode(82);
    pub const ESCAPE: Keycode = Keycode(111);
    pub const FORWARD_DEL: Keycode = Keycode(112);
    pub const MOVE_HOME: Keycode = Keycode(122);
    pub const MOVE_END: Keycode = Keycode(123);
    pub const APP_SWITCH: Keycode = Keycode(187);
}

impl fmt::Display for Keycode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "keycode {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_action_roundtrip() {
        for action in [KeyEventAction::Down, KeyEventAction::Up, KeyEventAction::Multiple] {
            assert_eq!(KeyEventAction::try_from(action as u8).unwrap(), action);
        }
        assert!(KeyEventAction::try_from(3).is_err());
    }

    #[test]
    fn motion_action_invalid() {
        assert_eq!(
            MotionEventAction::try_from(12).unwrap(),
            MotionEventAction::ButtonRelease
        );
        assert!(MotionEventAction::try_from(13).is_err());
    }

    #[test]
    fn shift_meta_state() {
        let meta = MetaState::SHIFT_ON | MetaState::SHIFT_LEFT_ON;
        assert_eq!(meta.bits(), 0x41);
    }
}

//! Host mouse clicks injected as touch events.
//!
//! The device sees the mouse as a dedicated pointer
//! ([`POINTER_ID_MOUSE`]) so it never collides with real fingers.

use bitflags::bitflags;

use crate::android::{MotionButtons, MotionEventAction};
use crate::control::{ControlMessage, POINTER_ID_MOUSE};
use crate::coords::Position;

bitflags! {
    /// Host mouse button state, in the usual desktop mask layout
    /// (left, middle, right, then the two extra buttons).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MouseButtons: u32 {
        const LEFT = 1 << 0;
        const MIDDLE = 1 << 1;
        const RIGHT = 1 << 2;
        const X1 = 1 << 3;
        const X2 = 1 << 4;
    }
}

impl From<MouseButtons> for MotionButtons {
    fn from(buttons: MouseButtons) -> Self {
        const MAPPING: [(MouseButtons, MotionButtons); 5] = [
            (MouseButtons::LEFT, MotionButtons::PRIMARY),
            (MouseButtons::RIGHT, MotionButtons::SECONDARY),
            (MouseButtons::MIDDLE, MotionButtons::TERTIARY),
            (MouseButtons::X1, MotionButtons::BACK),
            (MouseButtons::X2, MotionButtons::FORWARD),
        ];
        MAPPING
            .iter()
            .filter(|(host, _)| buttons.contains(*host))
            .fold(MotionButtons::empty(), |acc, (_, android)| acc | *android)
    }
}

/// Whether a button went down or came up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClickAction {
    Down,
    Up,
}

impl From<ClickAction> for MotionEventAction {
    fn from(action: ClickAction) -> Self {
        match action {
            ClickAction::Down => MotionEventAction::Down,
            ClickAction::Up => MotionEventAction::Up,
        }
    }
}

/// A single mouse button transition at a position on the device screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseClick {
    pub position: Position,
    pub action: ClickAction,
    /// Buttons held after the transition.
    pub buttons: MouseButtons,
}

impl From<MouseClick> for ControlMessage {
    fn from(click: MouseClick) -> Self {
        ControlMessage::InjectTouchEvent {
            action: click.action.into(),
            pointer_id: POINTER_ID_MOUSE,
            position: click.position,
            pressure: match click.action {
                ClickAction::Down => 1.0,
                ClickAction::Up => 0.0,
            },
            buttons: click.buttons.into(),
        }
    }
}

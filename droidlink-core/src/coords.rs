//! Screen coordinates as sent in touch and scroll messages.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::buffer::{write16be, write32be};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

/// A point together with the frame size it was measured against.
///
/// The device rescales the point if its actual frame size differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub point: Point,
    pub screen_size: Size,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Size {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

impl Position {
    pub const fn new(point: Point, screen_size: Size) -> Self {
        Self { point, screen_size }
    }

    /// Encoded size on the wire.
    pub const SIZE: usize = 12;

    /// `x:i32 y:i32 width:u16 height:u16`, big-endian.
    pub fn write(&self, buf: &mut impl BufMut) {
        write32be(buf, self.point.x as u32);
        write32be(buf, self.point.y as u32);
        write16be(buf, self.screen_size.width);
        write16be(buf, self.screen_size.height);
    }
}

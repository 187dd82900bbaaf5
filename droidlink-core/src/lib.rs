//! # droidlink-core
//!
//! Client-side transport and protocol layer for mirroring an Android
//! device through a companion server process.
//!
//! This crate contains:
//! - **Wire primitives**: big-endian helpers and UTF-8-safe truncation (`buffer`)
//! - **Messages**: `ControlMessage` (client → device) and `DeviceMessage` (device → client)
//! - **Mouse**: host clicks converted to touch events on the mouse pointer
//! - **Codec**: `ControlMessageEncoder` / `DeviceMessageDecoder` for `tokio_util` framing
//! - **Media**: `PacketHeader`, `Packet` and the `Demuxer` that rebuilds access units
//! - **Transport**: the `RemoteControl` capability (`Adb`), the `Tunnel` and the `Server` launcher
//! - **Channels**: the `Controller` writer loop and the `Receiver` reader loop
//! - **Session**: `Session` wires the loops together under one cancellation token
//! - **Error**: `DroidlinkError`, a typed `thiserror` hierarchy

pub mod adb;
pub mod android;
pub mod buffer;
pub mod codec;
pub mod control;
pub mod controller;
pub mod coords;
pub mod demux;
pub mod device;
pub mod error;
pub mod header;
pub mod mouse;
pub mod network;
pub mod packet;
pub mod receiver;
pub mod server;
pub mod session;
pub mod task;
pub mod tunnel;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use adb::{Adb, RemoteControl, RemoteProcess};
pub use android::{KeyEventAction, Keycode, MetaState, MotionButtons, MotionEventAction};
pub use codec::{ControlMessageEncoder, DeviceMessageDecoder};
pub use control::{ControlMessage, CopyKey, ScreenPowerMode};
pub use controller::{Completion, Controller, ControllerHandle};
pub use coords::{Point, Position, Size};
pub use demux::{CodecId, DemuxEvent, Demuxer, PacketSink, StreamConfig};
pub use device::DeviceMessage;
pub use error::{DeserializeError, DroidlinkError, Result};
pub use header::{PACKET_HEADER_SIZE, PacketHeader};
pub use mouse::{ClickAction, MouseButtons, MouseClick};
pub use network::Connection;
pub use packet::Packet;
pub use receiver::Receiver;
pub use server::{
    DeviceInfo, DeviceInfoLayout, LockVideoOrientation, LogLevel, Server, SessionParameters,
};
pub use session::{Session, SessionReport};
pub use task::{LoopOutcome, LoopPool};
pub use tunnel::{Tunnel, TunnelMode};

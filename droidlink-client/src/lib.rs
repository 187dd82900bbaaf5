//! # droidlink-client: headless mirroring client
//!
//! Loads a TOML configuration, launches the device-side server through
//! adb, runs one session and drains the video stream into a statistics
//! sink.

pub mod config;
pub mod stats;

//! Launching the device-side server and linking its sockets.
//!
//! [`Server::run`] pushes the server payload, opens a [`Tunnel`], starts
//! the remote process, connects the video (and optionally control)
//! streams and reads the device-info header. [`Server::close`] tears it
//! all down again.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::adb::{RemoteControl, RemoteProcess};
use crate::buffer::read16be;
use crate::coords::Size;
use crate::error::{DroidlinkError, Result};
use crate::network::{Connection, read_full};
use crate::tunnel::{DEFAULT_DEVICE_SOCKET_NAME, Tunnel, TunnelMode};

pub const DEFAULT_DEVICE_SERVER_PATH: &str = "/data/local/tmp/scrcpy-server.jar";
pub const DEFAULT_SERVER_VERSION: &str = "3.1";
pub const DEVICE_NAME_FIELD_LENGTH: usize = 64;

pub const CONNECT_ATTEMPTS: u32 = 100;
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);
pub const PROCESS_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

// ── Parameters ───────────────────────────────────────────────────

/// Log level of the device-side server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Verbose,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized as the integer the server expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum LockVideoOrientation {
    #[default]
    Unlocked,
    /// Lock whatever orientation the device has at startup.
    Initial,
    Fixed(u8),
}

impl TryFrom<i8> for LockVideoOrientation {
    type Error = String;

    fn try_from(value: i8) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Unlocked),
            -2 => Ok(Self::Initial),
            0..=3 => Ok(Self::Fixed(value as u8)),
            _ => Err(format!("invalid video orientation lock: {value}")),
        }
    }
}

impl From<LockVideoOrientation> for i8 {
    fn from(value: LockVideoOrientation) -> Self {
        match value {
            LockVideoOrientation::Unlocked => -1,
            LockVideoOrientation::Initial => -2,
            LockVideoOrientation::Fixed(n) => n as i8,
        }
    }
}

/// Layout of the header sent on the video socket after connecting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceInfoLayout {
    #[default]
    NameOnly,
    /// Older servers append the initial frame width and height.
    WithFrameSize,
}

impl DeviceInfoLayout {
    pub fn header_len(self) -> usize {
        match self {
            DeviceInfoLayout::NameOnly => DEVICE_NAME_FIELD_LENGTH,
            DeviceInfoLayout::WithFrameSize => DEVICE_NAME_FIELD_LENGTH + 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParameters {
    pub log_level: LogLevel,
    pub max_size: u16,
    pub video_bit_rate: u32,
    pub max_fps: u16,
    pub lock_video_orientation: LockVideoOrientation,
    pub crop: Option<String>,
    pub control: bool,
    pub display_id: u32,
    pub show_touches: bool,
    pub stay_awake: bool,
    pub force_adb_forward: bool,
    pub power_off_on_close: bool,
    pub clipboard_autosync: bool,
    pub downsize_on_error: bool,
    pub cleanup: bool,
    pub codec_options: Option<String>,
    pub encoder_name: Option<String>,
    pub port: Option<u16>,
    pub server_path: PathBuf,
    pub device_server_path: String,
    pub version: String,
    pub device_socket_name: String,
    pub device_info: DeviceInfoLayout,
}

impl Default for SessionParameters {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            max_size: 0,
            video_bit_rate: 8_000_000,
            max_fps: 0,
            lock_video_orientation: LockVideoOrientation::Unlocked,
            crop: None,
            control: true,
            display_id: 0,
            show_touches: false,
            stay_awake: false,
            force_adb_forward: false,
            power_off_on_close: false,
            clipboard_autosync: true,
            downsize_on_error: true,
            cleanup: true,
            codec_options: None,
            encoder_name: None,
            port: None,
            server_path: PathBuf::from("scrcpy-server"),
            device_server_path: DEFAULT_DEVICE_SERVER_PATH.to_string(),
            version: DEFAULT_SERVER_VERSION.to_string(),
            device_socket_name: DEFAULT_DEVICE_SOCKET_NAME.to_string(),
            device_info: DeviceInfoLayout::NameOnly,
        }
    }
}

/// Build the `adb` arguments that start the server.
///
/// Only options that differ from the server's own defaults are passed.
pub fn server_args(params: &SessionParameters, tunnel_forward: bool) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "shell".into(),
        format!("CLASSPATH={}", params.device_server_path),
        "app_process".into(),
        "/".into(),
        "com.genymobile.scrcpy.Server".into(),
        params.version.clone(),
        format!("log_level={}", params.log_level),
        format!("video_bit_rate={}", params.video_bit_rate),
        "audio=false".into(),
    ];

    if params.max_size != 0 {
        args.push(format!("max_size={}", params.max_size));
    }
    if params.max_fps != 0 {
        args.push(format!("max_fps={}", params.max_fps));
    }
    if params.lock_video_orientation != LockVideoOrientation::Unlocked {
        args.push(format!(
            "lock_video_orientation={}",
            i8::from(params.lock_video_orientation)
        ));
    }
    if tunnel_forward {
        args.push("tunnel_forward=true".into());
    }
    if let Some(crop) = params.crop.as_deref().filter(|c| !c.is_empty()) {
        args.push(format!("crop={crop}"));
    }
    if !params.control {
        args.push("control=false".into());
    }
    if params.display_id != 0 {
        args.push(format!("display_id={}", params.display_id));
    }
    if params.show_touches {
        args.push("show_touches=true".into());
    }
    if params.stay_awake {
        args.push("stay_awake=true".into());
    }
    if let Some(options) = params.codec_options.as_deref().filter(|c| !c.is_empty()) {
        args.push(format!("codec_options={options}"));
    }
    if let Some(encoder) = params.encoder_name.as_deref().filter(|c| !c.is_empty()) {
        args.push(format!("encoder_name={encoder}"));
    }
    if params.power_off_on_close {
        args.push("power_off_on_close=true".into());
    }
    if !params.clipboard_autosync {
        args.push("clipboard_autosync=false".into());
    }
    if !params.downsize_on_error {
        args.push("downsize_on_error=false".into());
    }
    if !params.cleanup {
        args.push("cleanup=false".into());
    }
    args
}

// ── Device info ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_name: String,
    pub frame_size: Option<Size>,
}

/// Read the fixed-width header sent first on the video socket.
pub async fn read_device_info<R>(reader: &mut R, layout: DeviceInfoLayout) -> Result<DeviceInfo>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let expected = layout.header_len();
    let mut buf = vec![0u8; expected];
    let actual = read_full(reader, &mut buf).await?;
    if actual < expected {
        return Err(DroidlinkError::TruncatedHeader { expected, actual });
    }

    // the last byte of the name field is always a terminator
    let name = &buf[..DEVICE_NAME_FIELD_LENGTH - 1];
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    let device_name = String::from_utf8_lossy(&name[..end]).into_owned();

    let frame_size = match layout {
        DeviceInfoLayout::NameOnly => None,
        DeviceInfoLayout::WithFrameSize => read16be(&buf, DEVICE_NAME_FIELD_LENGTH)
            .zip(read16be(&buf, DEVICE_NAME_FIELD_LENGTH + 2))
            .map(|(width, height)| Size { width, height }),
    };

    Ok(DeviceInfo {
        device_name,
        frame_size,
    })
}

/// Dial `addr` until the server answers with its readiness byte.
///
/// A connection that closes before sending the byte counts as a failed
/// attempt; the server is probably not listening yet.
pub async fn retry_connect(addr: SocketAddr, attempts: u32, delay: Duration) -> Result<TcpStream> {
    for attempt in 1..=attempts {
        match TcpStream::connect(addr).await {
            Ok(mut stream) => {
                let mut probe = [0u8; 1];
                match stream.read(&mut probe).await {
                    Ok(1) => return Ok(stream),
                    Ok(_) => debug!(attempt, "server closed connection before ready"),
                    Err(e) => debug!(attempt, "readiness probe failed: {e}"),
                }
            }
            Err(e) => debug!(attempt, "connect to {addr} failed: {e}"),
        }
        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }
    Err(DroidlinkError::ConnectFailed { attempts })
}

// ── Server ───────────────────────────────────────────────────────

pub struct Server {
    params: SessionParameters,
    remote: Arc<dyn RemoteControl>,
    process_timeout: Duration,
    connect_attempts: u32,
    connect_delay: Duration,
    process: Option<Box<dyn RemoteProcess>>,
    tunnel_mode: Option<TunnelMode>,
    info: Option<DeviceInfo>,
    video: Option<Connection>,
    control: Option<Connection>,
}

impl Server {
    pub fn new(params: SessionParameters, remote: Arc<dyn RemoteControl>) -> Self {
        Self {
            params,
            remote,
            process_timeout: PROCESS_WAIT_TIMEOUT,
            connect_attempts: CONNECT_ATTEMPTS,
            connect_delay: CONNECT_RETRY_DELAY,
            process: None,
            tunnel_mode: None,
            info: None,
            video: None,
            control: None,
        }
    }

    pub fn with_process_timeout(mut self, timeout: Duration) -> Self {
        self.process_timeout = timeout;
        self
    }

    pub fn with_connect_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.connect_attempts = attempts;
        self.connect_delay = delay;
        self
    }

    pub fn params(&self) -> &SessionParameters {
        &self.params
    }

    pub fn tunnel_mode(&self) -> Option<TunnelMode> {
        self.tunnel_mode
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    pub fn take_video(&mut self) -> Option<Connection> {
        self.video.take()
    }

    pub fn take_control(&mut self) -> Option<Connection> {
        self.control.take()
    }

    /// Start the server on the device and connect to it.
    pub async fn run(&mut self) -> Result<DeviceInfo> {
        if self.process.is_some() {
            return Err(DroidlinkError::InvalidState("server already running"));
        }

        self.remote.start_server().await?;
        self.remote
            .push(&self.params.server_path, &self.params.device_server_path)
            .await?;

        let mut tunnel = Tunnel::new(self.remote.clone(), &self.params.device_socket_name);
        let mode = tunnel
            .open(self.params.port, self.params.force_adb_forward)
            .await?;
        self.tunnel_mode = Some(mode);

        let linked = self.launch_and_connect(&mut tunnel, mode).await;
        // the mapping is only needed until both sockets are linked
        if let Err(e) = tunnel.close().await {
            warn!("tunnel close failed: {e}");
        }
        let (mut video, control) = linked?;

        let info = read_device_info(video.stream_mut(), self.params.device_info).await?;
        info!(device = %info.device_name, frame_size = ?info.frame_size, "server connected");

        self.video = Some(video);
        self.control = control;
        self.info = Some(info.clone());
        Ok(info)
    }

    async fn launch_and_connect(
        &mut self,
        tunnel: &mut Tunnel,
        mode: TunnelMode,
    ) -> Result<(Connection, Option<Connection>)> {
        let args = server_args(&self.params, mode == TunnelMode::Forward);
        self.process = Some(self.remote.spawn_shell(&args).await?);

        match mode {
            TunnelMode::Forward => {
                let addr = tunnel
                    .local_addr()
                    .ok_or(DroidlinkError::InvalidState("forward tunnel without port"))?;
                let video =
                    retry_connect(addr, self.connect_attempts, self.connect_delay).await?;
                let control = if self.params.control {
                    Some(Connection::connect(addr).await?)
                } else {
                    None
                };
                Ok((Connection::new(video), control))
            }
            TunnelMode::Reverse => {
                let video = tunnel.next_connection().await?;
                let control = if self.params.control {
                    Some(Connection::new(tunnel.next_connection().await?))
                } else {
                    None
                };
                Ok((Connection::new(video), control))
            }
        }
    }

    /// Close remaining connections and stop the remote process.
    ///
    /// The process gets `process_timeout` to exit on its own before it is
    /// killed.
    pub async fn close(&mut self) -> Result<()> {
        for connection in [self.video.take(), self.control.take()].into_iter().flatten() {
            if let Err(e) = connection.close().await {
                debug!("connection close: {e}");
            }
        }

        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        match tokio::time::timeout(self.process_timeout, process.wait()).await {
            Ok(Ok(code)) => {
                debug!(?code, "server process exited");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("waiting for server process failed: {e}");
                process.kill().await
            }
            Err(_) => {
                warn!(
                    timeout = ?self.process_timeout,
                    "server process still alive, killing it"
                );
                process.kill().await
            }
        }
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("params", &self.params)
            .field("tunnel_mode", &self.tunnel_mode)
            .field("info", &self.info)
            .field("running", &self.process.is_some())
            .finish()
    }
}

//! Transport bridge between the local process and the device socket.
//!
//! Two strategies are available:
//!
//! - **reverse**: listen on a local port and ask the device to dial it;
//!   accepted streams are queued in acceptance order.
//! - **forward**: map a local port to the device socket and dial it.
//!
//! [`Tunnel::open`] tries reverse first and falls back to forward when the
//! reverse mapping cannot be registered.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adb::RemoteControl;
use crate::error::{DroidlinkError, Result};

pub const DEFAULT_DEVICE_SOCKET_NAME: &str = "scrcpy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelMode {
    Forward,
    Reverse,
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelMode::Forward => f.write_str("forward"),
            TunnelMode::Reverse => f.write_str("reverse"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Unopened,
    Open(TunnelMode),
    Closed,
}

pub struct Tunnel {
    remote: Arc<dyn RemoteControl>,
    device_socket_name: String,
    state: TunnelState,
    local_port: Option<u16>,
    accept_task: Option<JoinHandle<()>>,
    connections: Option<mpsc::UnboundedReceiver<TcpStream>>,
}

impl Tunnel {
    pub fn new(remote: Arc<dyn RemoteControl>, device_socket_name: impl Into<String>) -> Self {
        Self {
            remote,
            device_socket_name: device_socket_name.into(),
            state: TunnelState::Unopened,
            local_port: None,
            accept_task: None,
            connections: None,
        }
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    /// `None` until the tunnel is open.
    pub fn mode(&self) -> Option<TunnelMode> {
        match self.state {
            TunnelState::Open(mode) => Some(mode),
            _ => None,
        }
    }

    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_port
            .map(|port| SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    pub fn has_listener(&self) -> bool {
        self.accept_task.is_some()
    }

    /// Accepted connections not yet claimed by [`Tunnel::next_connection`].
    pub fn queued_connections(&self) -> usize {
        self.connections.as_ref().map_or(0, |rx| rx.len())
    }

    /// Open the tunnel, preferring reverse mode unless `force_forward`.
    ///
    /// `port` pins the local port; `None` lets the OS or the bridge pick.
    pub async fn open(&mut self, port: Option<u16>, force_forward: bool) -> Result<TunnelMode> {
        if self.state != TunnelState::Unopened {
            return Err(DroidlinkError::InvalidState("tunnel already opened"));
        }

        if !force_forward {
            match self.enable_reverse(port).await {
                Ok(()) => return Ok(self.opened(TunnelMode::Reverse)),
                Err(e) => {
                    warn!("reverse tunnel failed, falling back to forward: {e}");
                    self.release_listener().await;
                    self.local_port = None;
                }
            }
        }

        self.enable_forward(port).await?;
        Ok(self.opened(TunnelMode::Forward))
    }

    fn opened(&mut self, mode: TunnelMode) -> TunnelMode {
        info!(%mode, port = ?self.local_port, "tunnel open");
        self.state = TunnelState::Open(mode);
        mode
    }

    async fn enable_reverse(&mut self, port: Option<u16>) -> Result<()> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port.unwrap_or(0))).await?;
        let local_port = listener.local_addr()?.port();
        let (tx, rx) = mpsc::unbounded_channel();

        self.accept_task = Some(tokio::spawn(accept_loop(listener, tx)));
        self.connections = Some(rx);
        self.local_port = Some(local_port);

        self.remote
            .reverse(&self.device_socket_name, local_port)
            .await
    }

    async fn enable_forward(&mut self, port: Option<u16>) -> Result<()> {
        let local_port = self.remote.forward(port, &self.device_socket_name).await?;
        self.local_port = Some(local_port);
        Ok(())
    }

    /// Pop the next accepted connection (reverse mode only).
    pub async fn next_connection(&mut self) -> Result<TcpStream> {
        if self.mode() != Some(TunnelMode::Reverse) {
            return Err(DroidlinkError::InvalidState(
                "connections are only queued in reverse mode",
            ));
        }
        let rx = self
            .connections
            .as_mut()
            .ok_or(DroidlinkError::InvalidState("no connection queue"))?;
        rx.recv().await.ok_or(DroidlinkError::ChannelClosed)
    }

    /// Remove the mapping and release local resources.
    ///
    /// Idempotent. A failing remote command is returned, but the listener
    /// and queued connections are released regardless.
    pub async fn close(&mut self) -> Result<()> {
        let mode = match self.state {
            TunnelState::Open(mode) => mode,
            TunnelState::Unopened | TunnelState::Closed => return Ok(()),
        };
        self.state = TunnelState::Closed;

        let result = match mode {
            TunnelMode::Forward => match self.local_port {
                Some(port) => self.remote.forward_remove(port).await,
                None => Ok(()),
            },
            TunnelMode::Reverse => self.remote.reverse_remove(&self.device_socket_name).await,
        };
        self.release_listener().await;

        if let Err(e) = &result {
            warn!(%mode, "failed to remove tunnel mapping: {e}");
        } else {
            debug!(%mode, "tunnel closed");
        }
        result
    }

    /// Stop accepting and close every connection still queued.
    ///
    /// The listener is owned by the accept task, so the port is only free
    /// once the aborted task has been joined.
    async fn release_listener(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(mut rx) = self.connections.take() {
            rx.close();
            let mut dropped = 0;
            while let Ok(stream) = rx.try_recv() {
                drop(stream);
                dropped += 1;
            }
            if dropped > 0 {
                debug!(dropped, "closed unclaimed tunnel connections");
            }
        }
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tunnel")
            .field("device_socket_name", &self.device_socket_name)
            .field("state", &self.state)
            .field("local_port", &self.local_port)
            .field("queued", &self.queued_connections())
            .finish()
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::UnboundedSender<TcpStream>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "tunnel accepted connection");
                if tx.send(stream).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("tunnel accept failed: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::adb::RemoteProcess;

    #[derive(Default)]
    struct RecordingRemote {
        calls: Mutex<Vec<String>>,
        fail_reverse: bool,
        fail_remove: bool,
        /// Bind the forwarded port locally, as the adb server does.
        bind_forward: bool,
        forwarded: tokio::sync::Mutex<Option<TcpListener>>,
    }

    impl RecordingRemote {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn failure(command: &str) -> DroidlinkError {
            DroidlinkError::RemoteCommand {
                command: command.into(),
                status: Some(1),
                stderr: "error: closed".into(),
            }
        }
    }

    #[async_trait]
    impl RemoteControl for RecordingRemote {
        async fn start_server(&self) -> Result<()> {
            Ok(())
        }

        async fn push(&self, _local: &Path, _remote: &str) -> Result<()> {
            Ok(())
        }

        async fn forward(&self, local_port: Option<u16>, device_socket: &str) -> Result<u16> {
            self.record(format!("forward {device_socket}"));
            if self.bind_forward {
                let listener =
                    TcpListener::bind((Ipv4Addr::LOCALHOST, local_port.unwrap_or(0))).await?;
                let port = listener.local_addr()?.port();
                *self.forwarded.lock().await = Some(listener);
                return Ok(port);
            }
            Ok(local_port.unwrap_or(27183))
        }

        async fn forward_remove(&self, local_port: u16) -> Result<()> {
            self.record(format!("forward_remove {local_port}"));
            Ok(())
        }

        async fn reverse(&self, device_socket: &str, _local_port: u16) -> Result<()> {
            self.record(format!("reverse {device_socket}"));
            if self.fail_reverse {
                return Err(Self::failure("reverse"));
            }
            Ok(())
        }

        async fn reverse_remove(&self, device_socket: &str) -> Result<()> {
            self.record(format!("reverse_remove {device_socket}"));
            if self.fail_remove {
                return Err(Self::failure("reverse --remove"));
            }
            Ok(())
        }

        async fn spawn_shell(&self, _args: &[String]) -> Result<Box<dyn RemoteProcess>> {
            Err(DroidlinkError::InvalidState("not supported"))
        }
    }

    #[tokio::test]
    async fn reverse_queues_connections_in_order() {
        let remote = Arc::new(RecordingRemote::default());
        let mut tunnel = Tunnel::new(remote.clone(), "scrcpy");
        assert_eq!(tunnel.open(None, false).await.unwrap(), TunnelMode::Reverse);
        let addr = tunnel.local_addr().unwrap();

        let first = TcpStream::connect(addr).await.unwrap();
        let first_local = first.local_addr().unwrap();
        let _second = TcpStream::connect(addr).await.unwrap();

        let video = tunnel.next_connection().await.unwrap();
        assert_eq!(video.peer_addr().unwrap(), first_local);
        let _control = tunnel.next_connection().await.unwrap();

        tunnel.close().await.unwrap();
        assert!(!tunnel.has_listener());
        assert_eq!(remote.calls(), ["reverse scrcpy", "reverse_remove scrcpy"]);
    }

    #[tokio::test]
    async fn falls_back_to_forward_without_leaks() {
        let remote = Arc::new(RecordingRemote {
            fail_reverse: true,
            ..Default::default()
        });
        let mut tunnel = Tunnel::new(remote.clone(), "scrcpy");
        assert_eq!(tunnel.open(None, false).await.unwrap(), TunnelMode::Forward);
        assert!(!tunnel.has_listener());
        assert_eq!(tunnel.queued_connections(), 0);
        assert_eq!(tunnel.local_port(), Some(27183));

        tunnel.close().await.unwrap();
        assert_eq!(
            remote.calls(),
            ["reverse scrcpy", "forward scrcpy", "forward_remove 27183"]
        );
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn fallback_frees_pinned_port_before_forwarding() {
        let port = free_port();
        let remote = Arc::new(RecordingRemote {
            fail_reverse: true,
            bind_forward: true,
            ..Default::default()
        });
        let mut tunnel = Tunnel::new(remote.clone(), "scrcpy");
        assert_eq!(
            tunnel.open(Some(port), false).await.unwrap(),
            TunnelMode::Forward
        );
        assert_eq!(tunnel.local_port(), Some(port));
        assert!(remote.forwarded.lock().await.is_some());
    }

    #[tokio::test]
    async fn reverse_close_frees_the_port() {
        let port = free_port();
        let remote = Arc::new(RecordingRemote::default());
        let mut tunnel = Tunnel::new(remote, "scrcpy");
        assert_eq!(
            tunnel.open(Some(port), false).await.unwrap(),
            TunnelMode::Reverse
        );
        tunnel.close().await.unwrap();

        TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await.unwrap();
    }

    #[tokio::test]
    async fn force_forward_skips_reverse() {
        let remote = Arc::new(RecordingRemote::default());
        let mut tunnel = Tunnel::new(remote.clone(), "scrcpy");
        assert_eq!(tunnel.open(Some(1234), true).await.unwrap(), TunnelMode::Forward);
        assert_eq!(tunnel.local_port(), Some(1234));
        assert!(tunnel.next_connection().await.is_err());
        assert_eq!(remote.calls(), ["forward scrcpy"]);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let remote = Arc::new(RecordingRemote::default());
        let mut tunnel = Tunnel::new(remote.clone(), "scrcpy");
        tunnel.close().await.unwrap();
        assert!(remote.calls().is_empty());

        tunnel.open(None, true).await.unwrap();
        tunnel.close().await.unwrap();
        tunnel.close().await.unwrap();
        assert_eq!(tunnel.state(), TunnelState::Closed);
        assert_eq!(remote.calls().len(), 2);
        assert!(tunnel.open(None, true).await.is_err());
    }

    #[tokio::test]
    async fn close_failure_still_releases_listener() {
        let remote = Arc::new(RecordingRemote {
            fail_remove: true,
            ..Default::default()
        });
        let mut tunnel = Tunnel::new(remote, "scrcpy");
        tunnel.open(None, false).await.unwrap();
        let addr = tunnel.local_addr().unwrap();
        let _unclaimed = TcpStream::connect(addr).await.unwrap();

        assert!(matches!(
            tunnel.close().await,
            Err(DroidlinkError::RemoteCommand { .. })
        ));
        assert!(!tunnel.has_listener());
        assert_eq!(tunnel.queued_connections(), 0);
    }
}

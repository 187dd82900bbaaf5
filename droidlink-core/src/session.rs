//! A running mirroring session.
//!
//! [`Session::start`] takes a connected [`Server`] and spawns the
//! demuxer, controller and receiver loops. They share one cancellation
//! token: the first loop to stop, cleanly or not, ends the session.

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::{Controller, ControllerHandle};
use crate::demux::{Demuxer, PacketSink};
use crate::device::DeviceMessage;
use crate::error::{DroidlinkError, Result};
use crate::receiver::Receiver;
use crate::server::{DeviceInfo, Server};
use crate::task::{LoopOutcome, LoopPool};

/// Outcome of every loop, in spawn order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub device_info: DeviceInfo,
    pub loops: Vec<(&'static str, LoopOutcome)>,
}

impl SessionReport {
    pub fn is_clean(&self) -> bool {
        self.loops.iter().all(|(_, outcome)| !outcome.is_failure())
    }

    pub fn outcome(&self, name: &str) -> Option<&LoopOutcome> {
        self.loops
            .iter()
            .find(|(loop_name, _)| *loop_name == name)
            .map(|(_, outcome)| outcome)
    }
}

pub struct Session {
    server: Server,
    device_info: DeviceInfo,
    pool: LoopPool,
    controller: Option<ControllerHandle>,
    video_writer: Option<OwnedWriteHalf>,
}

impl Session {
    /// Spawn the session loops on a server that has completed
    /// [`Server::run`].
    ///
    /// Demuxed events go to `sinks`; device messages go to
    /// `on_device_message`. Without a control connection there is no
    /// controller and no receiver.
    pub fn start<F>(
        mut server: Server,
        sinks: Vec<PacketSink>,
        on_device_message: F,
    ) -> Result<Self>
    where
        F: FnMut(DeviceMessage) + Send + 'static,
    {
        let device_info = server
            .device_info()
            .cloned()
            .ok_or(DroidlinkError::InvalidState("server is not connected"))?;
        let video = server
            .take_video()
            .ok_or(DroidlinkError::InvalidState("video stream already taken"))?;

        let mut pool = LoopPool::new();
        let (video_reader, video_writer) = video.into_split();

        let mut demuxer = Demuxer::new(video_reader);
        for sink in sinks {
            demuxer.add_sink(sink);
        }
        pool.spawn("demuxer", move |token| async move {
            tokio::select! {
                _ = token.cancelled() => Ok(()),
                summary = demuxer.run() => summary.map(|summary| {
                    info!(packets = summary.packets, bytes = summary.bytes, "demuxer done");
                }),
            }
        });

        let controller = match server.take_control() {
            Some(control) => {
                let (control_reader, control_writer) = control.into_split();
                let controller = Controller::new(control_writer);
                let handle = controller.handle();
                pool.spawn("controller", move |token| controller.run(token));

                let receiver = Receiver::new(control_reader, on_device_message);
                pool.spawn("receiver", move |token| async move {
                    receiver.run(token).await.map(|delivered| {
                        debug!(delivered, "receiver done");
                    })
                });
                Some(handle)
            }
            None => None,
        };

        info!(device = %device_info.device_name, loops = pool.len(), "session started");
        Ok(Self {
            server,
            device_info,
            pool,
            controller,
            video_writer: Some(video_writer),
        })
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    /// Producer handle for control messages, when control is enabled.
    pub fn controller(&self) -> Option<ControllerHandle> {
        self.controller.clone()
    }

    pub fn token(&self) -> CancellationToken {
        self.pool.token()
    }

    /// Resolves once any loop has stopped or shutdown was requested.
    pub async fn cancelled(&self) {
        self.pool.token().cancelled().await
    }

    /// Stop every loop, close the sockets and the remote process.
    pub async fn shutdown(mut self) -> Result<SessionReport> {
        self.pool.cancel();
        self.controller = None;
        let loops = self.pool.join_all().await;

        if let Some(mut writer) = self.video_writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("video socket shutdown: {e}");
            }
        }
        self.server.close().await?;

        let report = SessionReport {
            device_info: self.device_info,
            loops,
        };
        info!(clean = report.is_clean(), "session closed");
        Ok(report)
    }
}

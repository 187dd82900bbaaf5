//! Packet statistics sink.
//!
//! Drains demuxed events and keeps running totals plus a smoothed packet
//! rate. Stands in for a decoder so the client can run headless.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use droidlink_core::{DemuxEvent, StreamConfig};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

const RATE_WINDOW: usize = 60;

/// Per-stream statistics, published through a `watch` channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub config: Option<StreamConfig>,
    /// Smoothed media packets per second.
    pub fps: f64,
    pub total_packets: u64,
    pub key_frames: u64,
    /// Payload bytes, including merged config data.
    pub total_bytes: u64,
    pub last_pts: Option<u64>,
}

pub struct StatsSink {
    rx: mpsc::UnboundedReceiver<DemuxEvent>,
    stats: StreamStats,
    stats_tx: watch::Sender<StreamStats>,
    samples: VecDeque<Duration>,
    last_packet: Option<Instant>,
}

impl StatsSink {
    pub fn new(rx: mpsc::UnboundedReceiver<DemuxEvent>) -> Self {
        let (stats_tx, _) = watch::channel(StreamStats::default());
        Self {
            rx,
            stats: StreamStats::default(),
            stats_tx,
            samples: VecDeque::with_capacity(RATE_WINDOW + 1),
            last_packet: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamStats> {
        self.stats_tx.subscribe()
    }

    /// Consume events until the demuxer drops its sender.
    pub async fn run(mut self) -> StreamStats {
        while let Some(event) = self.rx.recv().await {
            self.record(event, Instant::now());
        }
        info!(
            packets = self.stats.total_packets,
            bytes = self.stats.total_bytes,
            "video stream drained"
        );
        self.stats
    }

    fn record(&mut self, event: DemuxEvent, now: Instant) {
        match event {
            DemuxEvent::Config(config) => {
                info!(?config, codec = %config.codec(), "stream configured");
                self.stats.config = Some(config);
            }
            DemuxEvent::Packet(packet) => {
                if let Some(last) = self.last_packet.replace(now) {
                    self.samples.push_back(now.duration_since(last));
                    if self.samples.len() > RATE_WINDOW {
                        self.samples.pop_front();
                    }
                    let avg = self.samples.iter().map(Duration::as_secs_f64).sum::<f64>()
                        / self.samples.len() as f64;
                    self.stats.fps = if avg > 0.0 { 1.0 / avg } else { 0.0 };
                }
                self.stats.total_packets += 1;
                self.stats.total_bytes += packet.len() as u64;
                if packet.is_key_frame() {
                    self.stats.key_frames += 1;
                }
                self.stats.last_pts = packet.pts().or(self.stats.last_pts);
                debug!(?packet, "packet");
            }
        }
        self.stats_tx.send_replace(self.stats.clone());
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use droidlink_core::{CodecId, Packet};

    use super::*;

    #[test]
    fn counts_packets_and_rate() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut sink = StatsSink::new(rx);
        let watcher = sink.subscribe();
        let start = Instant::now();

        sink.record(
            DemuxEvent::Config(StreamConfig::Video {
                codec: CodecId::H264,
                width: 1080,
                height: 2400,
            }),
            start,
        );
        for i in 0..3u64 {
            let packet = Packet::new(Bytes::from_static(b"abcd"), Some(i * 100), i == 0);
            sink.record(
                DemuxEvent::Packet(packet),
                start + Duration::from_millis(100 * i),
            );
        }

        let stats = watcher.borrow().clone();
        assert_eq!(stats.total_packets, 3);
        assert_eq!(stats.total_bytes, 12);
        assert_eq!(stats.key_frames, 1);
        assert_eq!(stats.last_pts, Some(200));
        assert!((stats.fps - 10.0).abs() < 1e-6);
    }

    #[test]
    fn rate_tracks_only_the_recent_window() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut sink = StatsSink::new(rx);
        let packet = || DemuxEvent::Packet(Packet::new(Bytes::from_static(b"x"), None, false));
        let mut now = Instant::now();

        // a slow start that falls out of the window
        for _ in 0..10 {
            sink.record(packet(), now);
            now += Duration::from_secs(1);
        }
        for _ in 0..=RATE_WINDOW {
            now += Duration::from_millis(20);
            sink.record(packet(), now);
        }

        assert_eq!(sink.samples.len(), RATE_WINDOW);
        assert!((sink.stats.fps - 50.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn run_ends_when_sender_drops() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = StatsSink::new(rx);
        tx.send(DemuxEvent::Packet(Packet::new(Bytes::from_static(b"x"), Some(1), true)))
            .unwrap();
        drop(tx);
        assert_eq!(sink.run().await.total_packets, 1);
    }
}

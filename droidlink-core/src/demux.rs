//! Video/audio stream demultiplexer.
//!
//! Turns the raw bytes of the media socket into discrete [`Packet`]s:
//!
//! ```text
//! codec_id:u32                      once
//! width:u32 height:u32              once, video codecs only
//! ┌ header (12 bytes)  ┐
//! └ payload (length)   ┘            repeated until end of stream
//! ```
//!
//! For H.264/H.265 the decoder expects parameter sets in front of the
//! first frame, so configuration packets are held back and prepended to
//! the next media packet.

use std::fmt;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::buffer::read32be;
use crate::error::DroidlinkError;
use crate::header::{PACKET_HEADER_SIZE, PacketHeader};
use crate::network::read_full;
use crate::packet::Packet;

// ── CodecId ──────────────────────────────────────────────────────

/// Codec announced by the device, encoded as ASCII in a `u32`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    H264 = 0x6832_3634,
    H265 = 0x6832_3635,
    Av1 = 0x0061_7631,
    Opus = 0x6f70_7573,
    Aac = 0x0061_6163,
    Flac = 0x666c_6163,
    Raw = 0x0072_6177,
}

/// The device disabled this stream.
const CODEC_ID_DISABLED: u32 = 0;
/// The device failed to set up this stream.
const CODEC_ID_ERROR: u32 = 1;

impl TryFrom<u32> for CodecId {
    type Error = DroidlinkError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0x6832_3634 => Ok(CodecId::H264),
            0x6832_3635 => Ok(CodecId::H265),
            0x0061_7631 => Ok(CodecId::Av1),
            0x6f70_7573 => Ok(CodecId::Opus),
            0x0061_6163 => Ok(CodecId::Aac),
            0x666c_6163 => Ok(CodecId::Flac),
            0x0072_6177 => Ok(CodecId::Raw),
            _ => Err(DroidlinkError::InvalidCodec(value)),
        }
    }
}

impl CodecId {
    /// Decoder name understood by common decoding libraries.
    pub fn decoder_name(self) -> &'static str {
        match self {
            CodecId::H264 => "h264",
            CodecId::H265 => "hevc",
            CodecId::Av1 => "av1",
            CodecId::Opus => "opus",
            CodecId::Aac => "aac",
            CodecId::Flac => "flac",
            CodecId::Raw => "pcm_s16le",
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, CodecId::H264 | CodecId::H265 | CodecId::Av1)
    }

    /// Whether config packets must be merged into the next frame.
    pub fn must_merge_config_packet(self) -> bool {
        matches!(self, CodecId::H264 | CodecId::H265)
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.decoder_name())
    }
}

// ── Events ───────────────────────────────────────────────────────

/// Stream parameters, emitted once before any packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamConfig {
    Video {
        codec: CodecId,
        width: u32,
        height: u32,
    },
    Audio {
        codec: CodecId,
    },
}

impl StreamConfig {
    pub fn codec(&self) -> CodecId {
        match self {
            StreamConfig::Video { codec, .. } | StreamConfig::Audio { codec } => *codec,
        }
    }
}

/// What a sink receives. The channel closing means end of stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxEvent {
    Config(StreamConfig),
    Packet(Packet),
}

pub type PacketSink = mpsc::UnboundedSender<DemuxEvent>;

// ── PacketMerger ─────────────────────────────────────────────────

/// Holds the last config packet until the next media packet arrives.
#[derive(Debug, Default)]
pub struct PacketMerger {
    config: Option<Bytes>,
}

impl PacketMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the packet to emit, or `None` when it was buffered.
    ///
    /// A newer config packet replaces one still pending.
    pub fn merge(&mut self, mut packet: Packet) -> Option<Packet> {
        if packet.is_config() {
            self.config = Some(packet.into_data());
            return None;
        }
        if let Some(config) = self.config.take() {
            packet.prepend(&config);
        }
        Some(packet)
    }

    pub fn has_pending(&self) -> bool {
        self.config.is_some()
    }
}

// ── Demuxer ──────────────────────────────────────────────────────

/// Totals reported when the stream ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemuxSummary {
    pub config: Option<StreamConfig>,
    pub packets: u64,
    pub bytes: u64,
}

pub struct Demuxer<R> {
    reader: R,
    sinks: Vec<PacketSink>,
}

impl<R> Demuxer<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            sinks: Vec::new(),
        }
    }

    /// Attach a sink. Sinks receive events in attachment order.
    pub fn add_sink(&mut self, sink: PacketSink) {
        self.sinks.push(sink);
    }

    /// Attach a new unbounded sink and return its receiving end.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DemuxEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_sink(tx);
        rx
    }

    /// Run until the stream ends or every sink is gone.
    ///
    /// A stream truncated mid-header or mid-payload is a normal end of
    /// stream; sinks observe it as their channel closing.
    pub async fn run(mut self) -> Result<DemuxSummary, DroidlinkError> {
        let mut summary = DemuxSummary::default();

        let Some(raw_codec_id) = self.receive_u32().await? else {
            debug!("media stream closed before codec id");
            return Ok(summary);
        };
        if raw_codec_id == CODEC_ID_DISABLED || raw_codec_id == CODEC_ID_ERROR {
            return Err(DroidlinkError::InvalidCodec(raw_codec_id));
        }
        let codec = CodecId::try_from(raw_codec_id)?;

        let config = if codec.is_video() {
            let Some((width, height)) = self.receive_video_size().await? else {
                debug!("media stream closed before video size");
                return Ok(summary);
            };
            StreamConfig::Video {
                codec,
                width,
                height,
            }
        } else {
            StreamConfig::Audio { codec }
        };
        info!(?config, "stream configured");
        summary.config = Some(config);
        self.push_to_sinks(DemuxEvent::Config(config));

        let mut merger = codec.must_merge_config_packet().then(PacketMerger::new);

        while !self.sinks.is_empty() {
            let Some(packet) = self.receive_packet().await? else {
                break;
            };
            let packet = match merger.as_mut() {
                Some(merger) => match merger.merge(packet) {
                    Some(packet) => packet,
                    None => continue,
                },
                None => packet,
            };
            summary.packets += 1;
            summary.bytes += packet.len() as u64;
            self.push_to_sinks(DemuxEvent::Packet(packet));
        }

        info!(
            packets = summary.packets,
            bytes = summary.bytes,
            "media stream ended"
        );
        Ok(summary)
    }

    async fn receive_u32(&mut self) -> Result<Option<u32>, DroidlinkError> {
        let mut buf = [0u8; 4];
        if read_full(&mut self.reader, &mut buf).await? < buf.len() {
            return Ok(None);
        }
        Ok(read32be(&buf, 0))
    }

    async fn receive_video_size(&mut self) -> Result<Option<(u32, u32)>, DroidlinkError> {
        let mut buf = [0u8; 8];
        if read_full(&mut self.reader, &mut buf).await? < buf.len() {
            return Ok(None);
        }
        Ok(read32be(&buf, 0).zip(read32be(&buf, 4)))
    }

    /// `Ok(None)` when the stream ends before a full packet.
    async fn receive_packet(&mut self) -> Result<Option<Packet>, DroidlinkError> {
        let mut header = [0u8; PACKET_HEADER_SIZE];
        if read_full(&mut self.reader, &mut header).await? < PACKET_HEADER_SIZE {
            return Ok(None);
        }
        let header = PacketHeader::from_bytes(&header);
        let length = header.payload_length() as usize;
        if length == 0 {
            return Err(DroidlinkError::ProtocolViolation("empty media packet"));
        }

        // grows with the bytes actually received, not the declared length
        let mut data = Vec::new();
        (&mut self.reader)
            .take(length as u64)
            .read_to_end(&mut data)
            .await?;
        if data.len() < length {
            return Ok(None);
        }
        Ok(Some(Packet::from_header(&header, Bytes::from(data))))
    }

    fn push_to_sinks(&mut self, event: DemuxEvent) {
        self.sinks.retain(|sink| {
            let open = sink.send(event.clone()).is_ok();
            if !open {
                debug!("dropping closed packet sink");
            }
            open
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────

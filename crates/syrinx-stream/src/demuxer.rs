use std::time::Duration;

use bytes::Bytes;
use syrinx_playlist::{ContainerFormat, StreamKind};

use crate::error::StreamResult;

/// Identifier of one elementary-stream track on the demultiplexer side.
pub type TrackId = u64;

/// Elementary-stream track description. Two tracks with equal formats are
/// bit-identical and can share a host-side handle across a demultiplexer
/// restart.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrackFormat {
    pub kind: StreamKind,
    pub codec: String,
    /// Language of the adaptation set the track came from.
    pub lang: Option<String>,
    pub description: Option<String>,
}

impl TrackFormat {
    pub fn new(kind: StreamKind, codec: impl Into<String>) -> Self {
        Self {
            kind,
            codec: codec.into(),
            lang: None,
            description: None,
        }
    }
}

/// One timestamped unit of demuxed elementary-stream data.
#[derive(Clone, Debug)]
pub struct Block {
    pub dts: Duration,
    pub payload: Bytes,
}

/// Output sink offered to the inner demultiplexer.
///
/// The bridge implements this to intercept and buffer the demultiplexer's
/// output instead of handing it straight to the host.
pub trait EsOut {
    fn add_track(&mut self, format: TrackFormat) -> TrackId;
    fn send_block(&mut self, track: TrackId, block: Block);
    fn remove_track(&mut self, track: TrackId);
    fn set_pcr(&mut self, pcr: Duration);
}

/// The inner container demultiplexer for one track's byte stream.
pub trait Demuxer: Send {
    /// Consume raw container bytes, emitting tracks and blocks into `out`.
    fn feed(&mut self, data: &[u8], out: &mut dyn EsOut) -> StreamResult<()>;

    /// Whether this demultiplexer can pick up at an arbitrary point of the
    /// stream after a seek, without being recreated.
    fn can_resume_mid_stream(&self) -> bool;
}

pub trait DemuxerFactory: Send {
    /// `None` when no demultiplexer handles `format`.
    fn create(&self, format: ContainerFormat) -> Option<Box<dyn Demuxer>>;
}

/// The host player's real elementary-stream output.
pub trait HostOutput: Send + Sync {
    /// Register a track, returning the host-side handle.
    fn add_track(&self, format: &TrackFormat) -> u64;
    fn send(&self, handle: u64, block: Block);
    fn remove_track(&self, handle: u64);
    /// Announce the timestamp playback will resume from after a seek.
    fn set_next_display_time(&self, time: Duration);
    /// Propagate the advancing session reference clock.
    fn set_reference_time(&self, time: Duration);
}

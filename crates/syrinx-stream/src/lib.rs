//! Per-track streaming pipeline: the segment tracker that decides what to
//! fetch, and the bridge that fetches it, runs it through an inner
//! demultiplexer and paces the demuxed blocks out to the host player.

#![forbid(unsafe_code)]

mod demuxer;
mod error;
pub mod fixture;
mod sink;
mod stream;
mod tracker;

pub use demuxer::{Block, Demuxer, DemuxerFactory, EsOut, HostOutput, TrackFormat, TrackId};
pub use error::{StreamError, StreamResult};
pub use sink::BufferedEsOut;
pub use stream::{Stream, StreamStatus, TRANSFER_BLOCK};
pub use tracker::{NextChunk, SegmentTracker};

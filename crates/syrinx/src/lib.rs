//! Adaptive-bitrate streaming engine.
//!
//! Given a parsed playlist (periods of adaptation sets of representations),
//! the session selects representations against measured bandwidth, fetches
//! segments over pooled HTTP(S) connections, demultiplexes them per track
//! and paces the resulting elementary-stream blocks out to a host player.

#![forbid(unsafe_code)]

mod control;
mod error;
mod options;
mod session;

pub use control::{ControlQuery, ControlResponse};
pub use error::{SessionError, SessionResult};
pub use options::SessionOptions;
pub use session::{DemuxStep, PlaylistManager};

pub use syrinx_abr::{AbrOptions, LogicKind};
pub use syrinx_net::NetOptions;
pub use syrinx_playlist::{
    AdaptationSet, ContainerFormat, EntityId, IdGen, Period, Playlist, Representation, Segment,
    StreamKind, SubSegment,
};
pub use syrinx_stream::{
    Block, Demuxer, DemuxerFactory, EsOut, HostOutput, StreamStatus, TrackFormat, TrackId,
};

//! Playlist model: the Period → AdaptationSet → Representation → Segment
//! tree consumed by the segment tracker, plus chunk materialization.
//!
//! The tree is built once by an external manifest parser and is read-only
//! during playback; live refresh replaces the period list wholesale and
//! prunes already-consumed media segments.

#![forbid(unsafe_code)]

mod error;
mod ids;
mod model;

pub use error::{PlaylistError, PlaylistResult};
pub use ids::{EntityId, IdGen};
pub use model::{
    AdaptationSet, ContainerFormat, Period, Playlist, Representation, Segment, StreamKind,
    SubSegment,
};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use syrinx_abr::SharedLogic;
use syrinx_net::{Chunk, ChunkKind};
use syrinx_playlist::{ContainerFormat, EntityId, Playlist, Representation, StreamKind};
use tracing::debug;

use crate::error::StreamResult;

/// A chunk handed to the stream, with the container format of the set it
/// came from.
pub struct NextChunk {
    pub chunk: Chunk,
    pub format: ContainerFormat,
}

struct PrevRep {
    id: EntityId,
    bandwidth_bps: u64,
}

/// Per-track walk of one period of the playlist: decides what to fetch
/// next as pure state transitions, independent of how it is fetched. The
/// session builds a fresh tracker per adaptation set when it enters a
/// period.
///
/// State is the period index, the representation last played, the media
/// segment counter and the init/index one-shot flags.
pub struct SegmentTracker {
    playlist: Arc<RwLock<Playlist>>,
    logic: SharedLogic,
    kind: StreamKind,
    period_index: usize,
    prev: Option<PrevRep>,
    counter: u64,
    init_done: bool,
    index_done: bool,
}

impl SegmentTracker {
    pub fn new(
        playlist: Arc<RwLock<Playlist>>,
        logic: SharedLogic,
        kind: StreamKind,
        period_index: usize,
    ) -> Self {
        Self {
            playlist,
            logic,
            kind,
            period_index,
            prev: None,
            counter: 0,
            init_done: false,
            index_done: false,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn period_index(&self) -> usize {
        self.period_index
    }

    /// (period, set, next media number) for live segment pruning.
    pub fn consumed_up_to(&self) -> Option<(EntityId, EntityId, u64)> {
        let playlist = self.playlist.read();
        let period = playlist.period(self.period_index)?;
        let set = period.set_of_kind(self.kind)?;
        Some((period.id(), set.id(), self.counter))
    }

    /// Whether the playlist carries a period beyond this tracker's.
    pub fn has_next_period(&self) -> bool {
        self.period_index + 1 < self.playlist.read().period_count()
    }

    /// Produce the next chunk: init, then index, then media segments in
    /// order. `None` means this track exhausted its period; the session
    /// decides whether another period follows.
    pub fn next_chunk(&mut self) -> StreamResult<Option<NextChunk>> {
        let playlist = self.playlist.read();
        let Some(period) = playlist.period(self.period_index) else {
            return Ok(None);
        };
        let Some(set) = period.set_of_kind(self.kind) else {
            return Ok(None);
        };
        let format = set.format();
        let reps = set.representations();

        // A set that cannot bit-switch pins the representation that is
        // already playing.
        let locked = self
            .prev
            .as_ref()
            .filter(|_| !set.can_bit_switch())
            .and_then(|prev| reps.iter().find(|rep| rep.id() == prev.id));
        let chosen = match locked {
            Some(rep) => rep,
            None => {
                let current = self
                    .prev
                    .as_ref()
                    .and_then(|prev| reps.iter().find(|rep| rep.id() == prev.id));
                match self.logic.lock().select(reps, current) {
                    Some(rep) => rep,
                    None => return Ok(None),
                }
            }
        };

        let switched = self.prev.as_ref().map_or(true, |prev| prev.id != chosen.id());
        if switched {
            debug!(
                kind = ?self.kind,
                rep = chosen.id().value(),
                bandwidth_bps = chosen.bandwidth_bps(),
                "adopting representation"
            );
            // Only the init segment must be resent after a switch.
            self.init_done = false;
            self.prev = Some(PrevRep {
                id: chosen.id(),
                bandwidth_bps: chosen.bandwidth_bps(),
            });
        }

        if !self.init_done {
            self.init_done = true;
            if let Some(segment) = chosen.init_segment() {
                let chunk = segment.to_chunk(ChunkKind::Init)?;
                return Ok(Some(NextChunk { chunk, format }));
            }
        }
        if !self.index_done {
            self.index_done = true;
            if let Some(segment) = chosen.index_segment() {
                let chunk = segment.to_chunk(ChunkKind::Index)?;
                return Ok(Some(NextChunk { chunk, format }));
            }
        }

        // A fresh counter snaps to the first available media segment, so
        // live playlists whose early segments were pruned start at the
        // current edge.
        if self.counter == 0 {
            if let Some(first) = chosen.first_media_number() {
                self.counter = first;
            }
        }

        match chosen.media_segment(self.counter) {
            Some(segment) => {
                let chunk = segment.to_chunk(ChunkKind::Media)?;
                self.counter += 1;
                Ok(Some(NextChunk { chunk, format }))
            }
            None => {
                debug!(kind = ?self.kind, period = self.period_index, "period exhausted");
                Ok(None)
            }
        }
    }

    /// Map an absolute playback time to a media segment and, unless
    /// `try_only`, reposition the walk there. Returns whether the mapping
    /// succeeded.
    pub fn set_position(&mut self, time: Duration, try_only: bool) -> bool {
        let playlist = self.playlist.read();
        let located = (0..playlist.period_count()).find_map(|index| {
            let period = playlist.period(index)?;
            let end = period.start() + period.duration();
            if time >= period.start() && time < end {
                Some((index, period))
            } else {
                None
            }
        });
        let Some((index, period)) = located else {
            return false;
        };
        let Some(set) = period.set_of_kind(self.kind) else {
            return false;
        };
        let rep = self
            .prev
            .as_ref()
            .and_then(|prev| {
                set.representations()
                    .iter()
                    .find(|rep| rep.id() == prev.id)
            })
            .or_else(|| set.representations().first());
        let Some(number) = rep.and_then(|rep| rep.segment_number_by_time(time - period.start()))
        else {
            return false;
        };
        if try_only {
            return true;
        }
        debug!(kind = ?self.kind, number, period = index, "repositioned");
        if index != self.period_index {
            self.init_done = false;
            self.index_done = false;
        }
        drop(playlist);
        self.period_index = index;
        self.counter = number;
        true
    }
}

impl Drop for SegmentTracker {
    fn drop(&mut self) {
        if let Some(prev) = self.prev.take() {
            self.logic.lock().track_stopped(prev.bandwidth_bps);
        }
    }
}

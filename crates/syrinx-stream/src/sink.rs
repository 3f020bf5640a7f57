use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::demuxer::{Block, EsOut, HostOutput, TrackFormat, TrackId};

struct TrackEntry {
    id: TrackId,
    format: TrackFormat,
    host_handle: u64,
    queue: VecDeque<Block>,
    /// Cleared during a demultiplexer restart; a re-added track with a
    /// bit-identical format reclaims the entry and its host handle.
    active: bool,
    /// The demultiplexer removed the track; the entry lingers until its
    /// queue drains.
    closing: bool,
}

#[derive(Default)]
struct SinkState {
    tracks: Vec<TrackEntry>,
    next_track_id: TrackId,
    pcr: Option<Duration>,
    first_dts: Option<Duration>,
    furthest_dts: Option<Duration>,
    /// Adaptation-set metadata stamped onto every registered track.
    lang: Option<String>,
    description: Option<String>,
    /// A demultiplexer restart is in flight; deactivated entries may still
    /// be reclaimed and must not be reaped yet.
    restarting: bool,
}

/// The synthetic sink between the inner demultiplexer and the host output.
///
/// Demuxed blocks queue per track until their timestamp falls under the
/// release deadline. The state sits behind a mutex because the synchronous
/// demux path and a host-issued seek/flush may touch it from different
/// execution contexts.
pub struct BufferedEsOut {
    host: Arc<dyn HostOutput>,
    state: Mutex<SinkState>,
}

impl BufferedEsOut {
    pub fn new(host: Arc<dyn HostOutput>) -> Self {
        Self {
            host,
            state: Mutex::new(SinkState::default()),
        }
    }

    /// Smallest block timestamp ever observed; the reference-clock probe
    /// reads this.
    pub fn first_dts(&self) -> Option<Duration> {
        self.state.lock().first_dts
    }

    /// High-water block timestamp observed so far.
    pub fn furthest_dts(&self) -> Option<Duration> {
        self.state.lock().furthest_dts
    }

    pub fn pcr(&self) -> Option<Duration> {
        self.state.lock().pcr
    }

    /// Attach the adaptation set's language/description so the host sees
    /// them on every track this sink registers.
    pub fn set_track_metadata(&self, lang: Option<String>, description: Option<String>) {
        let mut state = self.state.lock();
        state.lang = lang;
        state.description = description;
    }

    /// Mark every track as awaiting re-registration by a restarted
    /// demultiplexer.
    pub fn begin_restart(&self) {
        let mut state = self.state.lock();
        state.restarting = true;
        for entry in &mut state.tracks {
            entry.active = false;
        }
    }

    /// The restarted demultiplexer has settled; entries it did not reclaim
    /// are reaped once their queues drain.
    pub fn end_restart(&self) {
        self.state.lock().restarting = false;
    }

    /// Forward queued blocks with `dts <= deadline` to the host, oldest
    /// first per track. Returns the number of blocks forwarded.
    pub fn release_up_to(&self, deadline: Duration) -> usize {
        let mut state = self.state.lock();
        let mut sent = 0;
        for entry in &mut state.tracks {
            while entry
                .queue
                .front()
                .is_some_and(|block| block.dts <= deadline)
            {
                if let Some(block) = entry.queue.pop_front() {
                    self.host.send(entry.host_handle, block);
                    sent += 1;
                }
            }
        }
        // Entries the demultiplexer no longer owns disappear once drained.
        // Deactivated entries survive an open restart window: the new
        // demultiplexer may still reclaim them.
        let host = &self.host;
        let restarting = state.restarting;
        state.tracks.retain(|entry| {
            let orphaned = !entry.active && !restarting;
            let done = (entry.closing || orphaned) && entry.queue.is_empty();
            if done {
                host.remove_track(entry.host_handle);
            }
            !done
        });
        if sent > 0 {
            trace!(sent, deadline_ms = deadline.as_millis() as u64, "released blocks");
        }
        sent
    }

    /// Seek support: discard queued blocks past `target` and reset the
    /// timestamp bookkeeping to what remains.
    pub fn drop_after(&self, target: Duration) {
        let mut state = self.state.lock();
        for entry in &mut state.tracks {
            entry.queue.retain(|block| block.dts <= target);
        }
        let remaining: Vec<Duration> = state
            .tracks
            .iter()
            .flat_map(|entry| entry.queue.iter().map(|block| block.dts))
            .collect();
        state.furthest_dts = remaining.iter().copied().max();
        state.first_dts = remaining.iter().copied().min();
        state.pcr = None;
    }

    pub fn set_next_display_time(&self, time: Duration) {
        self.host.set_next_display_time(time);
    }

    pub fn queued_blocks(&self) -> usize {
        self.state
            .lock()
            .tracks
            .iter()
            .map(|entry| entry.queue.len())
            .sum()
    }
}

impl EsOut for BufferedEsOut {
    fn add_track(&mut self, format: TrackFormat) -> TrackId {
        let mut state = self.state.lock();
        let mut format = format;
        if format.lang.is_none() {
            format.lang = state.lang.clone();
        }
        if format.description.is_none() {
            format.description = state.description.clone();
        }
        // Recycle an orphaned entry with a bit-identical format so the host
        // sees no re-negotiation across a restart.
        if let Some(entry) = state
            .tracks
            .iter_mut()
            .find(|entry| !entry.active && !entry.closing && entry.format == format)
        {
            entry.active = true;
            trace!(track = entry.id, "recycled track handle");
            return entry.id;
        }
        let id = state.next_track_id;
        state.next_track_id += 1;
        let host_handle = self.host.add_track(&format);
        debug!(track = id, host_handle, codec = %format.codec, "new track");
        state.tracks.push(TrackEntry {
            id,
            format,
            host_handle,
            queue: VecDeque::new(),
            active: true,
            closing: false,
        });
        id
    }

    fn send_block(&mut self, track: TrackId, block: Block) {
        let mut state = self.state.lock();
        state.first_dts = Some(state.first_dts.map_or(block.dts, |dts| dts.min(block.dts)));
        state.furthest_dts =
            Some(state.furthest_dts.map_or(block.dts, |dts| dts.max(block.dts)));
        if let Some(entry) = state.tracks.iter_mut().find(|entry| entry.id == track) {
            entry.queue.push_back(block);
        }
    }

    fn remove_track(&mut self, track: TrackId) {
        let mut state = self.state.lock();
        if let Some(entry) = state.tracks.iter_mut().find(|entry| entry.id == track) {
            entry.closing = true;
        }
    }

    fn set_pcr(&mut self, pcr: Duration) {
        self.state.lock().pcr = Some(pcr);
    }
}

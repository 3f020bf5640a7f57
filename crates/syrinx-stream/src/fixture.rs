//! Deterministic demultiplexer and host-output doubles shared by the tests
//! in this crate and in the session crate.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use syrinx_playlist::{ContainerFormat, StreamKind};

use crate::demuxer::{Block, Demuxer, DemuxerFactory, EsOut, HostOutput, TrackFormat, TrackId};
use crate::error::StreamResult;

/// Byte size of one encoded fixture record.
pub const RECORD_LEN: usize = 12;

/// Encode one record: a track index and a block timestamp in milliseconds.
pub fn record(track: u32, dts_ms: u64) -> [u8; RECORD_LEN] {
    let mut out = [0u8; RECORD_LEN];
    out[..4].copy_from_slice(&track.to_le_bytes());
    out[4..].copy_from_slice(&dts_ms.to_le_bytes());
    out
}

/// Build a segment body from a list of (track, dts-ms) records.
pub fn segment_body(records: &[(u32, u64)]) -> Vec<u8> {
    let mut body = Vec::with_capacity(records.len() * RECORD_LEN);
    for &(track, dts_ms) in records {
        body.extend_from_slice(&record(track, dts_ms));
    }
    body
}

/// A demultiplexer over the fixture record format.
///
/// Tracks are registered lazily on first appearance; every record becomes
/// one block and advances the program clock reference.
pub struct FakeDemuxer {
    stream_kind: StreamKind,
    resume_mid_stream: bool,
    pending: Vec<u8>,
    tracks: Vec<(u32, TrackId)>,
}

impl FakeDemuxer {
    pub fn new(stream_kind: StreamKind, resume_mid_stream: bool) -> Self {
        Self {
            stream_kind,
            resume_mid_stream,
            pending: Vec::new(),
            tracks: Vec::new(),
        }
    }

    fn track_id(&mut self, index: u32, out: &mut dyn EsOut) -> TrackId {
        if let Some(&(_, id)) = self.tracks.iter().find(|(idx, _)| *idx == index) {
            return id;
        }
        let id = out.add_track(TrackFormat::new(self.stream_kind, format!("fixture-{index}")));
        self.tracks.push((index, id));
        id
    }
}

impl Demuxer for FakeDemuxer {
    fn feed(&mut self, data: &[u8], out: &mut dyn EsOut) -> StreamResult<()> {
        self.pending.extend_from_slice(data);
        while self.pending.len() >= RECORD_LEN {
            let raw: Vec<u8> = self.pending.drain(..RECORD_LEN).collect();
            let mut track_bytes = [0u8; 4];
            track_bytes.copy_from_slice(&raw[..4]);
            let mut dts_bytes = [0u8; 8];
            dts_bytes.copy_from_slice(&raw[4..]);
            let dts = Duration::from_millis(u64::from_le_bytes(dts_bytes));
            let track = self.track_id(u32::from_le_bytes(track_bytes), out);
            out.send_block(
                track,
                Block {
                    dts,
                    payload: Bytes::from(raw),
                },
            );
            out.set_pcr(dts);
        }
        Ok(())
    }

    fn can_resume_mid_stream(&self) -> bool {
        self.resume_mid_stream
    }
}

/// Factory producing [`FakeDemuxer`]s for every known container format.
pub struct FakeDemuxerFactory {
    pub stream_kind: StreamKind,
    pub resume_mid_stream: bool,
}

impl FakeDemuxerFactory {
    pub fn new(stream_kind: StreamKind) -> Self {
        Self {
            stream_kind,
            resume_mid_stream: true,
        }
    }
}

impl DemuxerFactory for FakeDemuxerFactory {
    fn create(&self, format: ContainerFormat) -> Option<Box<dyn Demuxer>> {
        if format == ContainerFormat::Unknown {
            return None;
        }
        Some(Box::new(FakeDemuxer::new(
            self.stream_kind,
            self.resume_mid_stream,
        )))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HostEvent {
    AddTrack(u64, TrackFormat),
    Send(u64, Duration),
    RemoveTrack(u64),
    NextDisplayTime(Duration),
    ReferenceTime(Duration),
}

/// Host output that records every call for assertions.
#[derive(Default)]
pub struct RecordingHost {
    events: Mutex<Vec<HostEvent>>,
    next_handle: Mutex<u64>,
}

impl RecordingHost {
    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    pub fn sent_dts(&self) -> Vec<Duration> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                HostEvent::Send(_, dts) => Some(*dts),
                _ => None,
            })
            .collect()
    }

    pub fn added_tracks(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, HostEvent::AddTrack(..)))
            .count()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl HostOutput for RecordingHost {
    fn add_track(&self, format: &TrackFormat) -> u64 {
        let mut next = self.next_handle.lock();
        let handle = *next;
        *next += 1;
        self.events
            .lock()
            .push(HostEvent::AddTrack(handle, format.clone()));
        handle
    }

    fn send(&self, handle: u64, block: Block) {
        self.events.lock().push(HostEvent::Send(handle, block.dts));
    }

    fn remove_track(&self, handle: u64) {
        self.events.lock().push(HostEvent::RemoveTrack(handle));
    }

    fn set_next_display_time(&self, time: Duration) {
        self.events.lock().push(HostEvent::NextDisplayTime(time));
    }

    fn set_reference_time(&self, time: Duration) {
        self.events.lock().push(HostEvent::ReferenceTime(time));
    }
}

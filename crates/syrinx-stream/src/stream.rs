use std::sync::Arc;
use std::time::{Duration, Instant};

use syrinx_net::{Connection, ConnectionManager};
use syrinx_playlist::ContainerFormat;
use tracing::{debug, warn};

use crate::{
    demuxer::{Demuxer, DemuxerFactory, HostOutput},
    error::{StreamError, StreamResult},
    sink::BufferedEsOut,
    tracker::SegmentTracker,
};

/// Upper bound on one network read inside `demux`.
pub const TRANSFER_BLOCK: usize = 32 * 1024;

/// Outcome of one demux call. Ordered so the aggregate across tracks is the
/// maximum: any buffering track stalls the session, end-of-period outranks
/// end-of-stream so a remaining period triggers a transition, and only
/// all-EOF ends the session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum StreamStatus {
    Eof,
    EofPeriod,
    Demuxed,
    Buffering,
}

enum Step {
    Progress,
    Eof,
    Stalled,
}

struct ActiveChunk {
    chunk: syrinx_net::Chunk,
    conn: Option<Connection>,
    queried: bool,
    started: Option<Instant>,
}

impl ActiveChunk {
    fn new(chunk: syrinx_net::Chunk) -> Self {
        Self {
            chunk,
            conn: None,
            queried: false,
            started: None,
        }
    }
}

/// One elementary-stream-type pipeline: tracker → fetch → inner demuxer →
/// buffered sink, driven to EOF or buffering independently of other tracks.
pub struct Stream {
    tracker: SegmentTracker,
    factory: Box<dyn DemuxerFactory>,
    demuxer: Option<Box<dyn Demuxer>>,
    format: Option<ContainerFormat>,
    sink: BufferedEsOut,
    current: Option<ActiveChunk>,
    /// The tracker exhausted its period; whether that is end-of-period or
    /// end-of-stream depends on the playlist and is decided per call.
    done: bool,
}

impl Stream {
    pub fn new(
        tracker: SegmentTracker,
        factory: Box<dyn DemuxerFactory>,
        host: Arc<dyn HostOutput>,
    ) -> Self {
        Self {
            tracker,
            factory,
            demuxer: None,
            format: None,
            sink: BufferedEsOut::new(host),
            current: None,
            done: false,
        }
    }

    pub fn tracker(&self) -> &SegmentTracker {
        &self.tracker
    }

    /// Forward the adaptation set's language/description to the sink so
    /// host-side tracks carry them.
    pub fn set_track_metadata(&mut self, lang: Option<String>, description: Option<String>) {
        self.sink.set_track_metadata(lang, description);
    }

    /// Read until the first block timestamp is known, without releasing
    /// anything to the host. Used to establish the session reference clock.
    pub fn probe(&mut self, manager: &mut ConnectionManager) -> Option<Duration> {
        while self.sink.first_dts().is_none() && !self.done {
            match self.read_step(manager) {
                Ok(Step::Progress) => {}
                Ok(Step::Eof) => self.done = true,
                Ok(Step::Stalled) => break,
                Err(err) => {
                    warn!(error = %err, "probe read failed");
                    self.finish_chunk(manager);
                    break;
                }
            }
        }
        self.sink.first_dts()
    }

    /// Advance this track toward `deadline`.
    ///
    /// Reads and demuxes until a block timestamp at or past the deadline has
    /// been produced, the track ends, or a fetch stalls. When `send` is set,
    /// buffered blocks due by the deadline go out to the host.
    pub fn demux(&mut self, manager: &mut ConnectionManager, deadline: Duration, send: bool) -> StreamStatus {
        while !self.done && !self.reached(deadline) {
            match self.read_step(manager) {
                Ok(Step::Progress) => {}
                Ok(Step::Eof) => self.done = true,
                Ok(Step::Stalled) => break,
                Err(err) => {
                    warn!(error = %err, "read failed, dropping chunk");
                    self.finish_chunk(manager);
                    break;
                }
            }
        }
        if send {
            self.sink.release_up_to(deadline);
        }
        if self.reached(deadline) {
            StreamStatus::Demuxed
        } else if self.done {
            self.end_status()
        } else {
            StreamStatus::Buffering
        }
    }

    /// An exhausted period is end-of-stream only when nothing follows it;
    /// a live refresh can append a period after the fact.
    fn end_status(&self) -> StreamStatus {
        if self.tracker.has_next_period() {
            StreamStatus::EofPeriod
        } else {
            StreamStatus::Eof
        }
    }

    /// Reposition to `target`. A `try_only` pass validates the mapping
    /// without moving anything.
    pub fn seek(&mut self, manager: &mut ConnectionManager, target: Duration, try_only: bool) -> bool {
        if !self.tracker.set_position(target, try_only) {
            return false;
        }
        if try_only {
            return true;
        }
        debug!(target_ms = target.as_millis() as u64, "seeking");
        self.finish_chunk(manager);
        self.sink.drop_after(target);
        if let Some(demuxer) = &self.demuxer {
            if !demuxer.can_resume_mid_stream() {
                // Force a restart; bit-identical host tracks get recycled.
                self.sink.begin_restart();
                self.demuxer = None;
            }
        }
        self.done = false;
        self.sink.set_next_display_time(target);
        true
    }

    fn reached(&self, deadline: Duration) -> bool {
        self.sink
            .furthest_dts()
            .is_some_and(|dts| dts >= deadline)
    }

    fn read_step(&mut self, manager: &mut ConnectionManager) -> StreamResult<Step> {
        if self.current.is_none() {
            match self.tracker.next_chunk()? {
                None => return Ok(Step::Eof),
                Some(next) => {
                    self.prepare_demuxer(next.format)?;
                    self.current = Some(ActiveChunk::new(next.chunk));
                }
            }
        }
        let Some(active) = self.current.as_mut() else {
            return Ok(Step::Stalled);
        };
        if active.conn.is_none() {
            active.conn = Some(manager.get_connection(&active.chunk)?);
        }
        let Some(conn) = active.conn.as_mut() else {
            return Ok(Step::Stalled);
        };

        if !active.queried {
            let mut abandon = false;
            match conn.query(&active.chunk) {
                Ok(()) => {
                    active.queried = true;
                    active.started = Some(Instant::now());
                    if let Some(length) = conn.content_length() {
                        active.chunk.set_content_length(length);
                    }
                }
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    debug!(error = %err, target = %active.chunk.path_and_query(), "chunk not fetchable");
                    abandon = true;
                }
            }
            if abandon {
                self.finish_chunk(manager);
                return Ok(Step::Stalled);
            }
        }

        let mut buf = vec![0u8; TRANSFER_BLOCK];
        let read = conn.read(&mut buf)?;
        if read > 0 {
            active.chunk.add_bytes_read(read as u64);
        }
        let chunk_done = conn.drained() || !conn.is_connected();
        let fed_any = active.chunk.bytes_read() > 0;

        if read > 0 {
            let demuxer = self
                .demuxer
                .as_mut()
                .ok_or(StreamError::UnsupportedFormat(ContainerFormat::Unknown))?;
            demuxer.feed(&buf[..read], &mut self.sink)?;
        }

        if chunk_done {
            self.finish_chunk(manager);
            if fed_any {
                // The demultiplexer has seen a full chunk; any restart
                // window closes here, with its tracks re-registered.
                self.sink.end_restart();
            }
        }
        Ok(Step::Progress)
    }

    fn prepare_demuxer(&mut self, format: ContainerFormat) -> StreamResult<()> {
        if self.demuxer.is_some() && self.format == Some(format) {
            return Ok(());
        }
        if self.demuxer.is_some() {
            debug!(?format, "container format changed, restarting demultiplexer");
            self.sink.begin_restart();
        }
        let demuxer = self
            .factory
            .create(format)
            .ok_or(StreamError::UnsupportedFormat(format))?;
        self.demuxer = Some(demuxer);
        self.format = Some(format);
        Ok(())
    }

    /// Tear down the in-flight chunk: report its throughput sample and give
    /// the connection back to the pool.
    fn finish_chunk(&mut self, manager: &mut ConnectionManager) {
        if let Some(active) = self.current.take() {
            if let Some(started) = active.started {
                if active.chunk.bytes_read() > 0 {
                    manager.update_download_rate(active.chunk.bytes_read(), started.elapsed());
                }
            }
            if let Some(conn) = active.conn {
                manager.release(conn);
            }
        }
    }

    /// Release any connection still held, without touching playback state.
    pub fn shutdown(&mut self, manager: &mut ConnectionManager) {
        self.finish_chunk(manager);
    }
}

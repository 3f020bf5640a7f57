use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use syrinx_abr::{AdaptationLogic, SharedLogic};
use syrinx_net::ConnectionManager;
use syrinx_playlist::{ContainerFormat, Playlist, StreamKind};
use syrinx_stream::{Demuxer, DemuxerFactory, HostOutput, SegmentTracker, Stream, StreamStatus};
use tracing::{debug, info, warn};

use crate::{
    control::{ControlQuery, ControlResponse},
    error::{SessionError, SessionResult},
    options::SessionOptions,
};

/// Outcome of one global demux step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DemuxStep {
    Success,
    Eof,
}

/// Consecutive failed manifest refreshes after which a live session stops
/// asking for updates.
const MAX_FAILED_UPDATES: u32 = 3;

struct SharedFactory(Arc<dyn DemuxerFactory + Send + Sync>);

impl DemuxerFactory for SharedFactory {
    fn create(&self, format: ContainerFormat) -> Option<Box<dyn Demuxer>> {
        self.0.create(format)
    }
}

/// The session orchestrator: owns one stream per adaptation set of the
/// current period, drives them in lockstep against a local reference clock
/// and answers the host's control surface.
pub struct PlaylistManager {
    playlist: Arc<RwLock<Playlist>>,
    options: SessionOptions,
    connections: ConnectionManager,
    logic: SharedLogic,
    factory: Arc<dyn DemuxerFactory + Send + Sync>,
    host: Arc<dyn HostOutput>,
    streams: Vec<Stream>,
    setup_index: usize,
    clock: Option<Duration>,
    /// Aggregate length, recomputed once per demux step instead of on
    /// every control call.
    cached_length: Duration,
    live: bool,
    last_refresh: Instant,
    failed_updates: u32,
}

impl PlaylistManager {
    pub fn new(
        playlist: Playlist,
        factory: Arc<dyn DemuxerFactory + Send + Sync>,
        host: Arc<dyn HostOutput>,
        options: SessionOptions,
    ) -> Self {
        let live = playlist.is_live();
        let cached_length = playlist.duration();
        let logic = SharedLogic::new(AdaptationLogic::new(options.abr.clone()));
        let mut connections = ConnectionManager::new(options.net.clone());
        connections.set_download_rate_observer(Arc::new(logic.clone()));
        let mut manager = Self {
            playlist: Arc::new(RwLock::new(playlist)),
            options,
            connections,
            logic,
            factory,
            host,
            streams: Vec::new(),
            setup_index: 0,
            clock: None,
            cached_length,
            live,
            last_refresh: Instant::now(),
            failed_updates: 0,
        };
        manager.setup_period(0);
        manager
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn playlist(&self) -> parking_lot::RwLockReadGuard<'_, Playlist> {
        self.playlist.read()
    }

    /// One pull-loop iteration: establish the reference clock if needed,
    /// then drive every stream to `clock + increment`.
    pub fn do_demux(&mut self, increment: Duration) -> DemuxStep {
        self.cached_length = self.playlist.read().duration();
        if self.streams.is_empty() {
            return DemuxStep::Eof;
        }
        let clock = match self.clock {
            Some(clock) => clock,
            None => {
                // Non-sending probe to discover the starting timestamp.
                let first = self
                    .streams
                    .iter_mut()
                    .filter_map(|stream| stream.probe(&mut self.connections))
                    .min()
                    .unwrap_or(Duration::ZERO);
                debug!(clock_ms = first.as_millis() as u64, "reference clock established");
                self.clock = Some(first);
                first
            }
        };

        let deadline = clock + increment;
        let mut aggregate = StreamStatus::Eof;
        for stream in &mut self.streams {
            let status = stream.demux(&mut self.connections, deadline, true);
            aggregate = aggregate.max(status);
        }

        match aggregate {
            StreamStatus::Eof => DemuxStep::Eof,
            StreamStatus::EofPeriod => self.next_period(),
            StreamStatus::Demuxed => {
                self.clock = Some(deadline);
                self.host.set_reference_time(deadline);
                if self.live {
                    self.prune_consumed();
                }
                DemuxStep::Success
            }
            StreamStatus::Buffering => {
                debug!(deadline_ms = deadline.as_millis() as u64, "buffering");
                DemuxStep::Success
            }
        }
    }

    /// Every stream finished the current period and at least one sees a
    /// period after it: rebuild the streams from the next period's full
    /// adaptation-set list, one period at a time.
    fn next_period(&mut self) -> DemuxStep {
        let next = self.setup_index + 1;
        if next < self.playlist.read().period_count() {
            info!(period = next, "transitioning to next period");
            self.setup_period(next);
            DemuxStep::Success
        } else {
            DemuxStep::Eof
        }
    }

    fn setup_period(&mut self, index: usize) {
        for stream in &mut self.streams {
            stream.shutdown(&mut self.connections);
        }
        self.streams.clear();

        // One stream per distinct stream kind in the period, carrying the
        // set's track metadata.
        let kinds: Vec<(StreamKind, Option<String>, Option<String>)> = {
            let playlist = self.playlist.read();
            match playlist.period(index) {
                Some(period) => {
                    let mut kinds: Vec<(StreamKind, Option<String>, Option<String>)> = Vec::new();
                    for set in period.adaptation_sets() {
                        if !kinds.iter().any(|(kind, ..)| *kind == set.kind()) {
                            kinds.push((
                                set.kind(),
                                set.lang().map(str::to_owned),
                                set.description().map(str::to_owned),
                            ));
                        }
                    }
                    kinds
                }
                None => Vec::new(),
            }
        };
        for (kind, lang, description) in kinds {
            let tracker =
                SegmentTracker::new(self.playlist.clone(), self.logic.clone(), kind, index);
            let mut stream = Stream::new(
                tracker,
                Box::new(SharedFactory(self.factory.clone())),
                self.host.clone(),
            );
            stream.set_track_metadata(lang, description);
            self.streams.push(stream);
        }
        self.setup_index = index;
        debug!(period = index, streams = self.streams.len(), "period set up");
    }

    fn prune_consumed(&mut self) {
        let consumed: Vec<_> = self
            .streams
            .iter()
            .filter_map(|stream| stream.tracker().consumed_up_to())
            .collect();
        let mut playlist = self.playlist.write();
        for (period, set, number) in consumed {
            playlist.prune_media_before(period, set, number);
        }
    }

    /// Whether the live manifest should be re-fetched now. Always false
    /// after [`MAX_FAILED_UPDATES`] consecutive failures.
    pub fn needs_update(&self) -> bool {
        self.live
            && self.failed_updates < MAX_FAILED_UPDATES
            && self.last_refresh.elapsed() >= self.options.refresh_interval
    }

    /// Merge a freshly parsed manifest into the playing playlist.
    pub fn update_playlist(&mut self, fresh: Playlist) {
        self.playlist.write().merge(fresh);
        self.cached_length = self.playlist.read().duration();
        self.failed_updates = 0;
        self.last_refresh = Instant::now();
    }

    pub fn mark_update_failed(&mut self) {
        self.failed_updates += 1;
        self.last_refresh = Instant::now();
        if self.failed_updates >= MAX_FAILED_UPDATES {
            warn!(failures = self.failed_updates, "giving up on manifest refresh");
        }
    }

    pub fn control(&mut self, query: ControlQuery) -> SessionResult<ControlResponse> {
        match query {
            ControlQuery::CanSeek => Ok(ControlResponse::Flag(self.can_seek())),
            ControlQuery::CanPause => Ok(ControlResponse::Flag(!self.live)),
            ControlQuery::CanControlPace => Ok(ControlResponse::Flag(true)),
            ControlQuery::GetLength => Ok(ControlResponse::Length(self.cached_length)),
            ControlQuery::GetTime => {
                Ok(ControlResponse::Time(self.clock.unwrap_or_default()))
            }
            ControlQuery::GetPosition => {
                if self.cached_length.is_zero() {
                    return Err(SessionError::Live);
                }
                let clock = self.clock.unwrap_or_default();
                Ok(ControlResponse::Position(
                    clock.as_secs_f64() / self.cached_length.as_secs_f64(),
                ))
            }
            ControlQuery::SetPosition(fraction) => {
                if !fraction.is_finite() {
                    return Err(SessionError::Unmappable);
                }
                if self.live || self.cached_length.is_zero() {
                    return Err(SessionError::Live);
                }
                let target = self.cached_length.mul_f64(fraction.clamp(0.0, 1.0));
                self.set_time(target)
            }
            ControlQuery::SetTime(target) => self.set_time(target),
            ControlQuery::GetPtsDelay => Ok(ControlResponse::PtsDelay(self.options.pts_delay)),
        }
    }

    fn can_seek(&self) -> bool {
        if self.live {
            return false;
        }
        let playlist = self.playlist.read();
        playlist.period(self.setup_index).is_some_and(|period| {
            period
                .adaptation_sets()
                .iter()
                .all(|set| set.format().supports_random_access())
        })
    }

    fn set_time(&mut self, target: Duration) -> SessionResult<ControlResponse> {
        if self.live {
            return Err(SessionError::Live);
        }
        if !self.can_seek() {
            return Err(SessionError::NotSeekable);
        }
        let Some(index) = self.period_containing(target) else {
            return Err(SessionError::Unmappable);
        };
        if index != self.setup_index {
            // The target lives in another period: validate the mapping
            // against that period before tearing anything down, then
            // rebuild the streams from its adaptation sets.
            if !self.period_maps_target(index, target) {
                return Err(SessionError::Unmappable);
            }
            self.setup_period(index);
        }
        // Two passes: every stream must be able to map the target before
        // any of them moves.
        for stream in &mut self.streams {
            if !stream.seek(&mut self.connections, target, true) {
                return Err(SessionError::Unmappable);
            }
        }
        for stream in &mut self.streams {
            stream.seek(&mut self.connections, target, false);
        }
        info!(target_ms = target.as_millis() as u64, "seeked");
        self.clock = Some(target);
        Ok(ControlResponse::Done)
    }

    fn period_containing(&self, target: Duration) -> Option<usize> {
        let playlist = self.playlist.read();
        (0..playlist.period_count()).find(|&index| {
            playlist.period(index).is_some_and(|period| {
                target >= period.start() && target < period.start() + period.duration()
            })
        })
    }

    /// Whether every adaptation set of the period can map `target` to a
    /// media segment.
    fn period_maps_target(&self, index: usize, target: Duration) -> bool {
        let playlist = self.playlist.read();
        playlist.period(index).is_some_and(|period| {
            period.adaptation_sets().iter().all(|set| {
                set.representations().first().is_some_and(|rep| {
                    rep.segment_number_by_time(target - period.start()).is_some()
                })
            })
        })
    }
}

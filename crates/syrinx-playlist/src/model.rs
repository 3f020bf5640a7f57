use std::time::Duration;

use syrinx_net::{ByteRange, Chunk, ChunkKind, NetResult};
use tracing::debug;
use url::Url;

use crate::{
    error::{PlaylistError, PlaylistResult},
    ids::EntityId,
};

/// Stream type of an adaptation set.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
    Application,
}

/// Container format fed to the inner demultiplexer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContainerFormat {
    Mp4,
    MpegTs,
    WebM,
    Unknown,
}

impl ContainerFormat {
    /// Whether seeking within this container is possible at all.
    pub fn supports_random_access(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A sub-range of a segment sharing its URL.
#[derive(Clone, Debug)]
pub struct SubSegment {
    pub range: ByteRange,
}

/// One addressable unit of media data.
///
/// The manifest parser resolves template addressing into absolute URLs, so
/// a segment is a URL plus an optional byte range.
#[derive(Clone, Debug)]
pub struct Segment {
    url: Url,
    range: Option<ByteRange>,
    duration: Duration,
    number: u64,
    sub_segments: Vec<SubSegment>,
}

impl Segment {
    pub fn new(url: Url, range: Option<ByteRange>, duration: Duration, number: u64) -> Self {
        Self {
            url,
            range,
            duration,
            number,
            sub_segments: Vec::new(),
        }
    }

    pub fn with_sub_segments(mut self, sub_segments: Vec<SubSegment>) -> Self {
        self.sub_segments = sub_segments;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn range(&self) -> Option<&ByteRange> {
        self.range.as_ref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn sub_segments(&self) -> &[SubSegment] {
        &self.sub_segments
    }

    /// Materialize this segment into a fetch unit.
    pub fn to_chunk(&self, kind: ChunkKind) -> NetResult<Chunk> {
        Chunk::new(self.url.clone(), kind, self.range)
    }

    /// Materialize one sub-segment: same URL, its own byte range.
    pub fn sub_chunk(&self, index: usize, kind: ChunkKind) -> Option<NetResult<Chunk>> {
        let sub = self.sub_segments.get(index)?;
        Some(Chunk::new(self.url.clone(), kind, Some(sub.range)))
    }
}

/// One encoded quality variant with its own segment list.
#[derive(Clone, Debug)]
pub struct Representation {
    id: EntityId,
    bandwidth_bps: u64,
    codecs: Vec<String>,
    resolution: Option<(u32, u32)>,
    init: Option<Segment>,
    index: Option<Segment>,
    media: Vec<Segment>,
}

impl Representation {
    /// Representations without a positive bandwidth are rejected outright.
    pub fn new(
        id: EntityId,
        bandwidth_bps: u64,
        codecs: Vec<String>,
        resolution: Option<(u32, u32)>,
    ) -> PlaylistResult<Self> {
        if bandwidth_bps == 0 {
            return Err(PlaylistError::ZeroBandwidth);
        }
        Ok(Self {
            id,
            bandwidth_bps,
            codecs,
            resolution,
            init: None,
            index: None,
            media: Vec::new(),
        })
    }

    pub fn with_init(mut self, init: Segment) -> Self {
        self.init = Some(init);
        self
    }

    pub fn with_index(mut self, index: Segment) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_media(mut self, media: Vec<Segment>) -> Self {
        self.media = media;
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn bandwidth_bps(&self) -> u64 {
        self.bandwidth_bps
    }

    pub fn codecs(&self) -> &[String] {
        &self.codecs
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.resolution
    }

    pub fn init_segment(&self) -> Option<&Segment> {
        self.init.as_ref()
    }

    pub fn index_segment(&self) -> Option<&Segment> {
        self.index.as_ref()
    }

    pub fn media_segments(&self) -> &[Segment] {
        &self.media
    }

    pub fn first_media_number(&self) -> Option<u64> {
        self.media.first().map(Segment::number)
    }

    pub fn last_media_number(&self) -> Option<u64> {
        self.media.last().map(Segment::number)
    }

    /// Look up a media segment by its sequence number.
    ///
    /// Numbering is consecutive from the first media segment, so the lookup
    /// is an offset computation.
    pub fn media_segment(&self, number: u64) -> Option<&Segment> {
        let first = self.first_media_number()?;
        let offset = number.checked_sub(first)?;
        self.media.get(offset as usize)
    }

    /// Map a period-relative time to a media segment number.
    pub fn segment_number_by_time(&self, time: Duration) -> Option<u64> {
        let mut elapsed = Duration::ZERO;
        for segment in &self.media {
            let end = elapsed + segment.duration();
            if time < end {
                return Some(segment.number());
            }
            elapsed = end;
        }
        None
    }

    /// Map a media segment number to its period-relative start time.
    pub fn playback_time_by_segment_number(&self, number: u64) -> Option<Duration> {
        let first = self.first_media_number()?;
        let offset = number.checked_sub(first)? as usize;
        if offset >= self.media.len() {
            return None;
        }
        let elapsed = self
            .media
            .iter()
            .take(offset)
            .map(Segment::duration)
            .sum();
        Some(elapsed)
    }

    /// Drop media segments older than `number` (live pruning).
    fn prune_media_before(&mut self, number: u64) -> usize {
        let before = self.media.len();
        self.media.retain(|segment| segment.number() >= number);
        before - self.media.len()
    }
}

/// A group of interchangeable-quality representations of one stream type.
#[derive(Clone, Debug)]
pub struct AdaptationSet {
    id: EntityId,
    kind: StreamKind,
    format: ContainerFormat,
    /// All representations share segment alignment, so switching between
    /// them needs no demuxer reset.
    bitstream_switching: bool,
    lang: Option<String>,
    description: Option<String>,
    representations: Vec<Representation>,
}

impl AdaptationSet {
    pub fn new(
        id: EntityId,
        kind: StreamKind,
        format: ContainerFormat,
        bitstream_switching: bool,
        representations: Vec<Representation>,
    ) -> Self {
        Self {
            id,
            kind,
            format,
            bitstream_switching,
            lang: None,
            description: None,
            representations,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    pub fn can_bit_switch(&self) -> bool {
        self.bitstream_switching
    }

    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn representations(&self) -> &[Representation] {
        &self.representations
    }

    pub fn representation(&self, index: usize) -> Option<&Representation> {
        self.representations.get(index)
    }
}

/// A time-bounded section of the playlist with parallel adaptation sets.
#[derive(Clone, Debug)]
pub struct Period {
    id: EntityId,
    start: Duration,
    /// Zero when unknown (live).
    duration: Duration,
    sets: Vec<AdaptationSet>,
}

impl Period {
    pub fn new(id: EntityId, duration: Duration, sets: Vec<AdaptationSet>) -> Self {
        Self {
            id,
            start: Duration::ZERO,
            duration,
            sets,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn adaptation_sets(&self) -> &[AdaptationSet] {
        &self.sets
    }

    pub fn set_of_kind(&self, kind: StreamKind) -> Option<&AdaptationSet> {
        self.sets.iter().find(|set| set.kind() == kind)
    }
}

/// The whole playlist: periods ordered and contiguous in time.
#[derive(Clone, Debug)]
pub struct Playlist {
    periods: Vec<Period>,
    live: bool,
}

impl Playlist {
    /// Build a playlist. Period start times are assigned cumulatively, so
    /// the period list is contiguous by construction.
    pub fn new(periods: Vec<Period>, live: bool) -> PlaylistResult<Self> {
        if periods.is_empty() {
            return Err(PlaylistError::Empty);
        }
        let mut playlist = Self { periods, live };
        playlist.assign_period_starts();
        Ok(playlist)
    }

    fn assign_period_starts(&mut self) {
        let mut start = Duration::ZERO;
        for period in &mut self.periods {
            period.start = start;
            start += period.duration;
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn period(&self, index: usize) -> Option<&Period> {
        self.periods.get(index)
    }

    pub fn first_period(&self) -> Option<&Period> {
        self.periods.first()
    }

    pub fn period_count(&self) -> usize {
        self.periods.len()
    }

    /// Total duration: the sum of period durations (zero-length periods
    /// contribute nothing, so a live playlist typically reports zero).
    pub fn duration(&self) -> Duration {
        self.periods.iter().map(Period::duration).sum()
    }

    /// Live refresh: replace the whole subtree with the freshly parsed one.
    pub fn merge(&mut self, fresh: Playlist) {
        debug!(
            old_periods = self.periods.len(),
            new_periods = fresh.periods.len(),
            "merging refreshed playlist"
        );
        self.periods = fresh.periods;
        self.live = fresh.live;
        self.assign_period_starts();
    }

    /// Drop media segments already consumed by a track: everything before
    /// `number` in every representation of the given set.
    pub fn prune_media_before(&mut self, period_id: EntityId, set_id: EntityId, number: u64) {
        for period in &mut self.periods {
            if period.id != period_id {
                continue;
            }
            for set in &mut period.sets {
                if set.id != set_id {
                    continue;
                }
                for rep in &mut set.representations {
                    let dropped = rep.prune_media_before(number);
                    if dropped > 0 {
                        debug!(
                            rep = rep.id().value(),
                            dropped, number, "pruned consumed segments"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::ids::IdGen;

    fn seg_url(name: &str) -> Url {
        Url::parse(&format!("http://example.com/{name}")).unwrap()
    }

    fn media_segments(count: u64, first_number: u64, duration: Duration) -> Vec<Segment> {
        (0..count)
            .map(|i| {
                Segment::new(
                    seg_url(&format!("seg-{}.m4s", first_number + i)),
                    None,
                    duration,
                    first_number + i,
                )
            })
            .collect()
    }

    fn representation(ids: &mut IdGen, bandwidth: u64, segments: u64) -> Representation {
        Representation::new(ids.next_id(), bandwidth, vec!["avc1".into()], None)
            .unwrap()
            .with_init(Segment::new(seg_url("init.mp4"), None, Duration::ZERO, 0))
            .with_media(media_segments(segments, 0, Duration::from_secs(2)))
    }

    #[test]
    fn zero_bandwidth_is_rejected() {
        let mut ids = IdGen::new();
        assert!(matches!(
            Representation::new(ids.next_id(), 0, vec![], None),
            Err(PlaylistError::ZeroBandwidth)
        ));
    }

    #[test]
    fn period_starts_are_contiguous() {
        let mut ids = IdGen::new();
        let periods = vec![
            Period::new(ids.next_id(), Duration::from_secs(10), vec![]),
            Period::new(ids.next_id(), Duration::from_secs(5), vec![]),
            Period::new(ids.next_id(), Duration::from_secs(7), vec![]),
        ];
        let playlist = Playlist::new(periods, false).unwrap();
        assert_eq!(playlist.period(0).unwrap().start(), Duration::ZERO);
        assert_eq!(playlist.period(1).unwrap().start(), Duration::from_secs(10));
        assert_eq!(playlist.period(2).unwrap().start(), Duration::from_secs(15));
        assert_eq!(playlist.duration(), Duration::from_secs(22));
    }

    #[test]
    fn empty_playlist_is_rejected() {
        assert!(matches!(Playlist::new(vec![], false), Err(PlaylistError::Empty)));
    }

    #[rstest]
    #[case::first_segment(Duration::ZERO, Some(0))]
    #[case::within_first(Duration::from_millis(1999), Some(0))]
    #[case::second(Duration::from_secs(2), Some(1))]
    #[case::last(Duration::from_secs(5), Some(2))]
    #[case::past_end(Duration::from_secs(6), None)]
    fn time_to_segment_number(#[case] time: Duration, #[case] expected: Option<u64>) {
        let mut ids = IdGen::new();
        let rep = representation(&mut ids, 1_000_000, 3);
        assert_eq!(rep.segment_number_by_time(time), expected);
    }

    #[rstest]
    #[case(0, Some(Duration::ZERO))]
    #[case(2, Some(Duration::from_secs(4)))]
    #[case::one_past_last(3, None)]
    #[case(9, None)]
    fn segment_number_to_time(#[case] number: u64, #[case] expected: Option<Duration>) {
        let mut ids = IdGen::new();
        let rep = representation(&mut ids, 1_000_000, 3);
        assert_eq!(rep.playback_time_by_segment_number(number), expected);
    }

    #[test]
    fn media_lookup_honors_first_number_offset() {
        let mut ids = IdGen::new();
        let rep = Representation::new(ids.next_id(), 500_000, vec![], None)
            .unwrap()
            .with_media(media_segments(3, 10, Duration::from_secs(2)));
        assert!(rep.media_segment(9).is_none());
        assert_eq!(rep.media_segment(10).unwrap().number(), 10);
        assert_eq!(rep.media_segment(12).unwrap().number(), 12);
        assert!(rep.media_segment(13).is_none());
    }

    #[test]
    fn segment_numbers_are_monotonic() {
        let mut ids = IdGen::new();
        let rep = representation(&mut ids, 1_000_000, 5);
        let numbers: Vec<u64> = rep.media_segments().iter().map(Segment::number).collect();
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn chunk_materialization_carries_range() {
        let range = ByteRange::new(128, Some(256)).unwrap();
        let segment = Segment::new(seg_url("seg.m4s"), Some(range), Duration::from_secs(2), 0);
        let chunk = segment.to_chunk(ChunkKind::Media).unwrap();
        assert_eq!(chunk.kind(), ChunkKind::Media);
        assert_eq!(chunk.range(), Some(&range));
    }

    #[test]
    fn sub_segments_fan_out_sharing_url() {
        let sub_a = SubSegment {
            range: ByteRange::new(0, Some(100)).unwrap(),
        };
        let sub_b = SubSegment {
            range: ByteRange::new(100, Some(200)).unwrap(),
        };
        let segment = Segment::new(seg_url("seg.m4s"), None, Duration::from_secs(2), 0)
            .with_sub_segments(vec![sub_a, sub_b]);

        let chunk_a = segment.sub_chunk(0, ChunkKind::Media).unwrap().unwrap();
        let chunk_b = segment.sub_chunk(1, ChunkKind::Media).unwrap().unwrap();
        assert_eq!(chunk_a.url(), chunk_b.url());
        assert_eq!(chunk_a.range().unwrap().start, 0);
        assert_eq!(chunk_b.range().unwrap().start, 100);
        assert!(segment.sub_chunk(2, ChunkKind::Media).is_none());
    }

    #[test]
    fn merge_swaps_whole_subtree() {
        let mut ids = IdGen::new();
        let old = Playlist::new(
            vec![Period::new(ids.next_id(), Duration::from_secs(4), vec![])],
            true,
        )
        .unwrap();
        let fresh = Playlist::new(
            vec![
                Period::new(ids.next_id(), Duration::from_secs(4), vec![]),
                Period::new(ids.next_id(), Duration::from_secs(4), vec![]),
            ],
            true,
        )
        .unwrap();

        let mut playlist = old;
        playlist.merge(fresh);
        assert_eq!(playlist.period_count(), 2);
        assert_eq!(playlist.period(1).unwrap().start(), Duration::from_secs(4));
    }

    #[test]
    fn pruning_drops_consumed_segments_only() {
        let mut ids = IdGen::new();
        let rep = Representation::new(ids.next_id(), 500_000, vec![], None)
            .unwrap()
            .with_media(media_segments(5, 0, Duration::from_secs(2)));
        let set = AdaptationSet::new(ids.next_id(), StreamKind::Audio, ContainerFormat::Mp4, true, vec![rep]);
        let set_id = set.id();
        let period = Period::new(ids.next_id(), Duration::ZERO, vec![set]);
        let period_id = period.id();
        let mut playlist = Playlist::new(vec![period], true).unwrap();

        playlist.prune_media_before(period_id, set_id, 3);

        let rep = &playlist.period(0).unwrap().adaptation_sets()[0].representations()[0];
        assert_eq!(rep.first_media_number(), Some(3));
        assert_eq!(rep.media_segments().len(), 2);
        // Lookup by number still works after pruning.
        assert_eq!(rep.media_segment(4).unwrap().number(), 4);
        assert!(rep.media_segment(2).is_none());
    }
}

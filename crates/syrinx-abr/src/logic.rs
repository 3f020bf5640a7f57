use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use syrinx_net::DownloadRateObserver;
use syrinx_playlist::Representation;
use tracing::{debug, trace};

use crate::rate::RateAverage;

/// Smallest transfer worth sampling; anything below half of this is noise
/// (keep-alive pings, header-only exchanges) and would skew the average.
pub const MIN_CHUNK_BYTES: u64 = 32 * 1024;

/// Selection policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogicKind {
    /// Budget follows the measured download rate.
    RateBased,
    /// Budget is a constant configured rate.
    FixedRate,
    AlwaysLowest,
    AlwaysBest,
}

/// Selection configuration.
#[derive(Clone, Debug)]
pub struct AbrOptions {
    pub kind: LogicKind,
    /// Budget for [`LogicKind::FixedRate`], in bits per second.
    pub fixed_rate_bps: u64,
    /// When set, candidates are first restricted to representations whose
    /// resolution matches exactly; no match falls back to all candidates.
    pub resolution: Option<(u32, u32)>,
}

impl Default for AbrOptions {
    fn default() -> Self {
        Self {
            kind: LogicKind::RateBased,
            fixed_rate_bps: 0,
            resolution: None,
        }
    }
}

/// Representation selector shared by all trackers of one session.
///
/// Keeps the throughput average fed by the connection layer and a ledger of
/// bandwidth committed to currently playing representations, so each track's
/// budget accounts for what the other tracks already consume.
#[derive(Debug)]
pub struct AdaptationLogic {
    options: AbrOptions,
    rate: RateAverage,
    used_bps: u64,
}

impl AdaptationLogic {
    pub fn new(options: AbrOptions) -> Self {
        Self {
            options,
            rate: RateAverage::new(),
            used_bps: 0,
        }
    }

    pub fn kind(&self) -> LogicKind {
        self.options.kind
    }

    pub fn average_bps(&self) -> u64 {
        self.rate.bps()
    }

    /// Fold in one transfer measurement from the connection layer.
    pub fn push_sample(&mut self, bytes: u64, elapsed: Duration) {
        let micros = elapsed.as_micros();
        if micros == 0 || bytes < MIN_CHUNK_BYTES / 2 {
            return;
        }
        let sample = ((bytes as u128 * 8 * 1_000_000) / micros) as u64;
        self.rate.push(sample);
        trace!(bytes, sample_bps = sample, avg_bps = self.rate.bps(), "rate sample");
    }

    /// Pick a representation for one track.
    ///
    /// `current` is the representation that track is playing, if any; its
    /// bandwidth is credited back so re-selecting it is never penalized.
    /// Updates the used-bandwidth ledger when the pick differs from
    /// `current`. Returns `None` only for an empty candidate list.
    pub fn select<'a>(
        &mut self,
        candidates: &'a [Representation],
        current: Option<&Representation>,
    ) -> Option<&'a Representation> {
        let current_bps = current.map(Representation::bandwidth_bps).unwrap_or(0);
        let budget = match self.options.kind {
            LogicKind::RateBased => {
                (self.rate.bps() * 3 / 4 + current_bps).saturating_sub(self.used_bps)
            }
            LogicKind::FixedRate => self.options.fixed_rate_bps,
            LogicKind::AlwaysLowest => {
                let picked = lowest(candidates)?;
                self.commit(current_bps, picked.bandwidth_bps());
                return Some(picked);
            }
            LogicKind::AlwaysBest => {
                let picked = highest(candidates)?;
                self.commit(current_bps, picked.bandwidth_bps());
                return Some(picked);
            }
        };

        let picked = self.pick_within_budget(candidates, budget)?;
        if picked.bandwidth_bps() != current_bps {
            debug!(
                budget_bps = budget,
                from_bps = current_bps,
                to_bps = picked.bandwidth_bps(),
                "representation switch"
            );
        }
        self.commit(current_bps, picked.bandwidth_bps());
        Some(picked)
    }

    /// Release the bandwidth committed to a track that stopped playing.
    pub fn track_stopped(&mut self, bandwidth_bps: u64) {
        self.used_bps = self.used_bps.saturating_sub(bandwidth_bps);
    }

    fn commit(&mut self, from_bps: u64, to_bps: u64) {
        self.used_bps = self.used_bps.saturating_sub(from_bps) + to_bps;
    }

    fn pick_within_budget<'a>(
        &self,
        candidates: &'a [Representation],
        budget: u64,
    ) -> Option<&'a Representation> {
        if let Some(target) = self.options.resolution {
            let constrained: Vec<&Representation> = candidates
                .iter()
                .filter(|rep| rep.resolution() == Some(target))
                .collect();
            if !constrained.is_empty() {
                return pick_by_budget(constrained.into_iter(), budget);
            }
        }
        pick_by_budget(candidates.iter(), budget)
    }
}

/// Highest bandwidth strictly below the budget; the lowest overall when
/// nothing fits, so selection never fails on a non-empty list.
fn pick_by_budget<'a>(
    candidates: impl Iterator<Item = &'a Representation> + Clone,
    budget: u64,
) -> Option<&'a Representation> {
    candidates
        .clone()
        .filter(|rep| rep.bandwidth_bps() < budget)
        .max_by_key(|rep| rep.bandwidth_bps())
        .or_else(|| candidates.min_by_key(|rep| rep.bandwidth_bps()))
}

fn lowest(candidates: &[Representation]) -> Option<&Representation> {
    candidates.iter().min_by_key(|rep| rep.bandwidth_bps())
}

fn highest(candidates: &[Representation]) -> Option<&Representation> {
    candidates.iter().max_by_key(|rep| rep.bandwidth_bps())
}

/// Cloneable handle to the session-wide logic.
///
/// The connection layer holds one as its rate observer while the trackers
/// lock it for selection, which closes the estimation feedback loop.
#[derive(Clone, Debug)]
pub struct SharedLogic {
    inner: Arc<Mutex<AdaptationLogic>>,
}

impl SharedLogic {
    pub fn new(logic: AdaptationLogic) -> Self {
        Self {
            inner: Arc::new(Mutex::new(logic)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, AdaptationLogic> {
        self.inner.lock()
    }
}

impl DownloadRateObserver for SharedLogic {
    fn update_download_rate(&self, bytes: u64, elapsed: Duration) {
        self.inner.lock().push_sample(bytes, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use syrinx_playlist::IdGen;

    use super::*;

    fn rep(ids: &mut IdGen, bandwidth: u64) -> Representation {
        Representation::new(ids.next_id(), bandwidth, vec![], None).unwrap()
    }

    fn rep_with_resolution(
        ids: &mut IdGen,
        bandwidth: u64,
        resolution: (u32, u32),
    ) -> Representation {
        Representation::new(ids.next_id(), bandwidth, vec![], Some(resolution)).unwrap()
    }

    fn ladder(ids: &mut IdGen) -> Vec<Representation> {
        vec![
            rep(ids, 500_000),
            rep(ids, 1_500_000),
            rep(ids, 3_000_000),
        ]
    }

    fn fixed(budget: u64) -> AdaptationLogic {
        AdaptationLogic::new(AbrOptions {
            kind: LogicKind::FixedRate,
            fixed_rate_bps: budget,
            ..AbrOptions::default()
        })
    }

    #[rstest]
    #[case::fits_middle(2_000_000, 1_500_000)]
    #[case::fits_best(10_000_000, 3_000_000)]
    #[case::strictly_below(1_500_000, 500_000)]
    #[case::nothing_fits(100_000, 500_000)]
    fn budget_selection(#[case] budget: u64, #[case] expected: u64) {
        let mut ids = IdGen::new();
        let reps = ladder(&mut ids);
        let mut logic = fixed(budget);
        let picked = logic.select(&reps, None).unwrap();
        assert_eq!(picked.bandwidth_bps(), expected);
        if expected != 500_000 || budget > 500_000 {
            assert!(picked.bandwidth_bps() < budget);
        }
    }

    #[test]
    fn empty_candidates_select_nothing() {
        let mut logic = fixed(1_000_000);
        assert!(logic.select(&[], None).is_none());
    }

    #[test]
    fn always_lowest_and_best() {
        let mut ids = IdGen::new();
        let reps = ladder(&mut ids);
        let mut lowest = AdaptationLogic::new(AbrOptions {
            kind: LogicKind::AlwaysLowest,
            ..AbrOptions::default()
        });
        let mut best = AdaptationLogic::new(AbrOptions {
            kind: LogicKind::AlwaysBest,
            ..AbrOptions::default()
        });
        assert_eq!(lowest.select(&reps, None).unwrap().bandwidth_bps(), 500_000);
        assert_eq!(best.select(&reps, None).unwrap().bandwidth_bps(), 3_000_000);
    }

    #[test]
    fn small_and_instant_samples_are_ignored() {
        let mut logic = AdaptationLogic::new(AbrOptions::default());
        logic.push_sample(MIN_CHUNK_BYTES / 2 - 1, Duration::from_millis(100));
        logic.push_sample(MIN_CHUNK_BYTES, Duration::ZERO);
        assert_eq!(logic.average_bps(), 0);
        logic.push_sample(MIN_CHUNK_BYTES / 2, Duration::from_millis(100));
        assert!(logic.average_bps() > 0);
    }

    #[test]
    fn sample_converts_bytes_per_elapsed_to_bps() {
        let mut logic = AdaptationLogic::new(AbrOptions::default());
        // 125_000 bytes in one second is exactly 1 Mbit/s.
        logic.push_sample(125_000, Duration::from_secs(1));
        assert_eq!(logic.average_bps(), 1_000_000);
    }

    #[test]
    fn rate_based_budget_credits_current_representation() {
        let mut ids = IdGen::new();
        let reps = ladder(&mut ids);
        let mut logic = AdaptationLogic::new(AbrOptions::default());
        logic.push_sample(250_000, Duration::from_secs(1)); // 2 Mbit/s avg

        // 2M * 3/4 = 1.5M budget: only the lowest rung fits strictly below.
        let first = logic.select(&reps, None).unwrap().bandwidth_bps();
        assert_eq!(first, 500_000);

        // Re-selecting with the current rung credited back keeps the budget
        // stable at 1.5M even though 500k is now in the ledger.
        let again = logic
            .select(&reps, Some(&reps[0]))
            .unwrap()
            .bandwidth_bps();
        assert_eq!(again, 500_000);
    }

    #[test]
    fn ledger_subtracts_other_tracks() {
        let mut ids = IdGen::new();
        let video = ladder(&mut ids);
        let audio = vec![rep(&mut ids, 400_000), rep(&mut ids, 900_000)];
        let mut logic = AdaptationLogic::new(AbrOptions {
            kind: LogicKind::RateBased,
            ..AbrOptions::default()
        });
        logic.push_sample(500_000, Duration::from_secs(1)); // 4 Mbit/s avg

        // Budget 3M: video takes the 1.5M rung.
        let v = logic.select(&video, None).unwrap().bandwidth_bps();
        assert_eq!(v, 1_500_000);
        // Audio budget is 3M - 1.5M = 1.5M: the 900k rung fits.
        let a = logic.select(&audio, None).unwrap().bandwidth_bps();
        assert_eq!(a, 900_000);
        // Releasing the audio track restores its share.
        logic.track_stopped(a);
        let v2 = logic
            .select(&video, Some(&video[1]))
            .unwrap()
            .bandwidth_bps();
        assert_eq!(v2, 1_500_000);
    }

    #[test]
    fn resolution_constraint_restricts_then_falls_back() {
        let mut ids = IdGen::new();
        let reps = vec![
            rep_with_resolution(&mut ids, 500_000, (640, 360)),
            rep_with_resolution(&mut ids, 1_500_000, (1280, 720)),
            rep_with_resolution(&mut ids, 3_000_000, (1920, 1080)),
        ];
        let mut constrained = AdaptationLogic::new(AbrOptions {
            kind: LogicKind::FixedRate,
            fixed_rate_bps: 10_000_000,
            resolution: Some((1280, 720)),
        });
        assert_eq!(
            constrained.select(&reps, None).unwrap().bandwidth_bps(),
            1_500_000
        );

        let mut no_match = AdaptationLogic::new(AbrOptions {
            kind: LogicKind::FixedRate,
            fixed_rate_bps: 10_000_000,
            resolution: Some((4096, 2160)),
        });
        assert_eq!(
            no_match.select(&reps, None).unwrap().bandwidth_bps(),
            3_000_000
        );
    }

    #[test]
    fn shared_logic_feeds_samples_through_observer() {
        let shared = SharedLogic::new(AdaptationLogic::new(AbrOptions::default()));
        let observer: &dyn DownloadRateObserver = &shared;
        observer.update_download_rate(250_000, Duration::from_secs(1));
        assert_eq!(shared.lock().average_bps(), 2_000_000);
    }
}

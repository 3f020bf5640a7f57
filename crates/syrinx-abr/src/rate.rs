/// Incremental running average of throughput samples, in bits per second.
///
/// Each sample folds in as `avg += (sample - avg) / n` with the division
/// remainder carried into the next sample, so repeated truncation cannot
/// bias the average downward.
#[derive(Debug, Default)]
pub struct RateAverage {
    avg_bps: u64,
    remainder: i64,
    count: u64,
}

impl RateAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample_bps: u64) {
        self.count += 1;
        let n = self.count as i64;
        let diff = sample_bps as i64 - self.avg_bps as i64 + self.remainder;
        let next = self.avg_bps as i64 + diff / n;
        self.avg_bps = next.max(0) as u64;
        self.remainder = diff % n;
    }

    pub fn bps(&self) -> u64 {
        self.avg_bps
    }

    pub fn sample_count(&self) -> u64 {
        self.count
    }
}

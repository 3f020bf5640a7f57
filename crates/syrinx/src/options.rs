use std::time::Duration;

use syrinx_abr::AbrOptions;
use syrinx_net::NetOptions;

/// Session-level configuration.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub net: NetOptions,
    pub abr: AbrOptions,
    /// Delay reported to the host between demux and presentation.
    pub pts_delay: Duration,
    /// Minimum interval between live manifest refreshes.
    pub refresh_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            net: NetOptions::default(),
            abr: AbrOptions::default(),
            pts_delay: Duration::from_secs(1),
            refresh_interval: Duration::from_secs(10),
        }
    }
}

//! Representation selection: rate-based and fixed policies, the session-wide
//! used-bandwidth ledger, and the observer seam through which the connection
//! layer feeds throughput measurements back into the estimate.

#![forbid(unsafe_code)]

mod logic;
mod rate;

pub use logic::{AbrOptions, AdaptationLogic, LogicKind, SharedLogic, MIN_CHUNK_BYTES};
pub use rate::RateAverage;

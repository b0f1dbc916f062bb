mod clock;
mod metrics;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use metrics::{ElectionMetrics, NoopElectionMetrics};
pub use store::LeaderStore;

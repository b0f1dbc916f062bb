//! Domain entities and invariants for lease-based leader election.

#![forbid(unsafe_code)]

mod identity;
mod lease;
mod status;

pub use identity::{LeaderId, ResourceId};
pub use lease::{LeaseRecord, LeaseVersion};
pub use status::{ElectionOutcome, ElectionRole, LeaderStatus, ReleaseOutcome};

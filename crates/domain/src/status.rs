//! Local leadership beliefs and the classification of election cycles.

use chrono::{DateTime, Utc};
use helmsman_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{LeaderId, LeaseRecord, LeaseVersion};

/// Per-resource election state as seen by one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionRole {
    /// No election cycle completed yet.
    Unknown,
    /// This instance holds the lease.
    Leader,
    /// Another instance holds the lease, or leadership could not be confirmed.
    Follower,
}

impl ElectionRole {
    /// Returns stable label value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Leader => "leader",
            Self::Follower => "follower",
        }
    }

    /// Parses label value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "unknown" => Ok(Self::Unknown),
            "leader" => Ok(Self::Leader),
            "follower" => Ok(Self::Follower),
            _ => Err(AppError::Validation(format!(
                "unknown election role '{value}'"
            ))),
        }
    }
}

/// Classification of one election cycle for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionOutcome {
    /// The lease was free or lapsed and this instance took it.
    Acquired,
    /// This instance extended the lease it already held.
    Renewed,
    /// Another instance holds the lease or won the conditional write.
    LostRace,
    /// The store could not be reached; leadership is not confirmed.
    StoreUnavailable,
}

impl ElectionOutcome {
    /// Returns stable metric label value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquired => "acquired",
            Self::Renewed => "renewed",
            Self::LostRace => "lost_race",
            Self::StoreUnavailable => "store_unavailable",
        }
    }

    /// Returns true when the cycle ended with this instance holding the lease.
    #[must_use]
    pub fn confirms_leadership(&self) -> bool {
        matches!(self, Self::Acquired | Self::Renewed)
    }
}

/// Result of one explicit release attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// The lease was cleared.
    Released,
    /// This instance was not the recorded holder.
    NotLeader,
    /// The store could not be reached.
    StoreUnavailable,
}

impl ReleaseOutcome {
    /// Returns stable metric label value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Released => "released",
            Self::NotLeader => "not_leader",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

/// Locally believed leadership of one resource.
///
/// Values are immutable; every election cycle produces a new status through
/// one of the transition methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderStatus {
    role: ElectionRole,
    current_leader: LeaderId,
    last_update: DateTime<Utc>,
    lease_expires_at: Option<DateTime<Utc>>,
    lease_version: Option<LeaseVersion>,
    last_outcome: Option<ElectionOutcome>,
}

impl LeaderStatus {
    /// Status of a freshly registered resource.
    #[must_use]
    pub fn unknown(now: DateTime<Utc>) -> Self {
        Self {
            role: ElectionRole::Unknown,
            current_leader: LeaderId::unknown(),
            last_update: now,
            lease_expires_at: None,
            lease_version: None,
            last_outcome: None,
        }
    }

    /// Transition after this instance acquired or renewed `lease`.
    pub fn confirmed(
        &self,
        lease: &LeaseRecord,
        outcome: ElectionOutcome,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        if !outcome.confirms_leadership() {
            return Err(AppError::Validation(format!(
                "outcome '{}' does not confirm leadership",
                outcome.as_str()
            )));
        }

        if lease.leader_id.is_sentinel() {
            return Err(AppError::Validation(format!(
                "sentinel '{}' cannot be elected for resource '{}'",
                lease.leader_id, lease.resource_id
            )));
        }

        Ok(Self {
            role: ElectionRole::Leader,
            current_leader: lease.leader_id.clone(),
            last_update: now,
            lease_expires_at: Some(lease.expires_at),
            lease_version: Some(lease.version),
            last_outcome: Some(outcome),
        })
    }

    /// Transition after another instance was observed holding the resource.
    #[must_use]
    pub fn contended(&self, current_leader: LeaderId, now: DateTime<Utc>) -> Self {
        Self {
            role: ElectionRole::Follower,
            current_leader,
            last_update: now,
            lease_expires_at: None,
            lease_version: None,
            last_outcome: Some(ElectionOutcome::LostRace),
        }
    }

    /// Transition after an indeterminate store call.
    ///
    /// Never keeps leadership: a leader becomes a follower of an unknown holder.
    #[must_use]
    pub fn store_unavailable(&self, now: DateTime<Utc>) -> Self {
        let role = match self.role {
            ElectionRole::Unknown => ElectionRole::Unknown,
            ElectionRole::Leader | ElectionRole::Follower => ElectionRole::Follower,
        };

        Self {
            role,
            current_leader: LeaderId::unknown(),
            last_update: now,
            lease_expires_at: None,
            lease_version: None,
            last_outcome: Some(ElectionOutcome::StoreUnavailable),
        }
    }

    /// Transition after an explicit step-down cleared the lease.
    #[must_use]
    pub fn released(&self, now: DateTime<Utc>) -> Self {
        Self {
            role: ElectionRole::Follower,
            current_leader: LeaderId::no_leader(),
            last_update: now,
            lease_expires_at: None,
            lease_version: None,
            last_outcome: self.last_outcome,
        }
    }

    /// Transition after a step-down found this instance is not the holder.
    ///
    /// Keeps the last election outcome.
    #[must_use]
    pub fn following(&self, current_leader: LeaderId, now: DateTime<Utc>) -> Self {
        Self {
            role: ElectionRole::Follower,
            current_leader,
            last_update: now,
            lease_expires_at: None,
            lease_version: None,
            last_outcome: self.last_outcome,
        }
    }

    /// Returns the election role.
    #[must_use]
    pub fn role(&self) -> ElectionRole {
        self.role
    }

    /// Returns the holder this instance last observed.
    #[must_use]
    pub fn current_leader(&self) -> &LeaderId {
        &self.current_leader
    }

    /// Returns when this status was produced.
    #[must_use]
    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Returns the expiry of the lease held by this instance, if any.
    #[must_use]
    pub fn lease_expires_at(&self) -> Option<DateTime<Utc>> {
        self.lease_expires_at
    }

    /// Returns the version of the lease held by this instance, if any.
    #[must_use]
    pub fn lease_version(&self) -> Option<LeaseVersion> {
        self.lease_version
    }

    /// Returns the classification of the cycle that produced this status.
    #[must_use]
    pub fn last_outcome(&self) -> Option<ElectionOutcome> {
        self.last_outcome
    }

    /// Returns true when the last cycle left this instance as leader.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.role == ElectionRole::Leader
    }

    /// Returns true while this instance is leader and its lease has not
    /// expired by the local clock.
    #[must_use]
    pub fn is_leader_at(&self, now: DateTime<Utc>) -> bool {
        self.is_leader()
            && self
                .lease_expires_at
                .is_some_and(|expires_at| expires_at > now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use proptest::prelude::*;

    use super::*;
    use crate::ResourceId;

    fn lease(leader: LeaderId, now: DateTime<Utc>) -> LeaseRecord {
        LeaseRecord {
            resource_id: ResourceId::new("r1").unwrap_or_else(|_| unreachable!()),
            leader_id: leader,
            expires_at: now + TimeDelta::milliseconds(500),
            version: LeaseVersion::new(3),
        }
    }

    fn node(name: &str) -> LeaderId {
        LeaderId::candidate(name).unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn new_status_is_unknown_and_not_leader() {
        let now = Utc::now();
        let status = LeaderStatus::unknown(now);
        assert_eq!(status.role(), ElectionRole::Unknown);
        assert!(status.current_leader().is_unknown());
        assert!(!status.is_leader_at(now));
    }

    #[test]
    fn confirmed_status_leads_until_lease_expiry() {
        let now = Utc::now();
        let status = LeaderStatus::unknown(now)
            .confirmed(&lease(node("a"), now), ElectionOutcome::Acquired, now)
            .unwrap_or_else(|_| unreachable!());

        assert!(status.is_leader_at(now));
        assert!(status.is_leader_at(now + TimeDelta::milliseconds(499)));
        assert!(!status.is_leader_at(now + TimeDelta::milliseconds(500)));
        assert_eq!(status.lease_version(), Some(LeaseVersion::new(3)));
    }

    #[test]
    fn sentinels_cannot_be_confirmed_as_leader() {
        let now = Utc::now();
        let status = LeaderStatus::unknown(now);
        assert!(
            status
                .confirmed(&lease(LeaderId::no_leader(), now), ElectionOutcome::Renewed, now)
                .is_err()
        );
        assert!(
            status
                .confirmed(&lease(LeaderId::unknown(), now), ElectionOutcome::Acquired, now)
                .is_err()
        );
    }

    #[test]
    fn non_confirming_outcome_is_rejected() {
        let now = Utc::now();
        let status = LeaderStatus::unknown(now);
        assert!(
            status
                .confirmed(&lease(node("a"), now), ElectionOutcome::LostRace, now)
                .is_err()
        );
    }

    #[test]
    fn store_unavailable_downgrades_leader_to_follower() {
        let now = Utc::now();
        let leader = LeaderStatus::unknown(now)
            .confirmed(&lease(node("a"), now), ElectionOutcome::Acquired, now)
            .unwrap_or_else(|_| unreachable!());

        let downgraded = leader.store_unavailable(now);
        assert_eq!(downgraded.role(), ElectionRole::Follower);
        assert!(downgraded.current_leader().is_unknown());
        assert!(!downgraded.is_leader_at(now));
        assert_eq!(
            downgraded.last_outcome(),
            Some(ElectionOutcome::StoreUnavailable)
        );
    }

    #[test]
    fn store_unavailable_keeps_unknown_role_before_first_election() {
        let now = Utc::now();
        let status = LeaderStatus::unknown(now).store_unavailable(now);
        assert_eq!(status.role(), ElectionRole::Unknown);
    }

    #[test]
    fn released_status_reports_no_leader() {
        let now = Utc::now();
        let status = LeaderStatus::unknown(now)
            .confirmed(&lease(node("a"), now), ElectionOutcome::Acquired, now)
            .unwrap_or_else(|_| unreachable!())
            .released(now);

        assert_eq!(status.role(), ElectionRole::Follower);
        assert!(status.current_leader().is_no_leader());
        assert!(!status.is_leader());
    }

    #[test]
    fn following_turns_unknown_into_follower_of_holder() {
        let now = Utc::now();
        let status = LeaderStatus::unknown(now).following(node("b"), now);

        assert_eq!(status.role(), ElectionRole::Follower);
        assert_eq!(status.current_leader(), &node("b"));
        assert_eq!(status.last_outcome(), None);
        assert!(!status.is_leader_at(now));
    }

    #[test]
    fn role_labels_parse_back() {
        for role in [
            ElectionRole::Unknown,
            ElectionRole::Leader,
            ElectionRole::Follower,
        ] {
            let parsed = ElectionRole::parse(role.as_str());
            assert!(parsed.is_ok());
            assert_eq!(parsed.unwrap_or_else(|_| unreachable!()), role);
        }
        assert!(ElectionRole::parse("candidate").is_err());
    }

    proptest! {
        #[test]
        fn only_confirmed_transitions_produce_leadership(steps in prop::collection::vec(0_u8..4, 1..32)) {
            let now = Utc::now();
            let mut status = LeaderStatus::unknown(now);

            for step in steps {
                status = match step {
                    0 => status
                        .confirmed(&lease(node("a"), now), ElectionOutcome::Renewed, now)
                        .unwrap_or_else(|_| unreachable!()),
                    1 => status.contended(node("b"), now),
                    2 => status.store_unavailable(now),
                    _ => status.released(now),
                };

                let confirmed = status
                    .last_outcome()
                    .is_some_and(|outcome| outcome.confirms_leadership());
                prop_assert_eq!(status.is_leader(), confirmed && step == 0);
                if status.is_leader() {
                    prop_assert!(!status.current_leader().is_sentinel());
                }
            }
        }
    }
}

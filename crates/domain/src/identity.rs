//! Identity value objects for contended resources and election candidates.

use std::fmt::{Display, Formatter};

use helmsman_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

const NO_LEADER_ID: &str = "NO_LEADER";
const UNKNOWN_LEADER_ID: &str = "UNKNOWN";

/// Identifier of one contended resource such as a shard or a singleton job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(NonEmptyString);

impl ResourceId {
    /// Creates a validated resource identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        NonEmptyString::new(value)
            .map(Self)
            .map_err(|_| AppError::Validation("resource id must not be empty".to_owned()))
    }

    /// Parses a comma separated list, skipping blank entries.
    pub fn parse_list(value: &str) -> AppResult<Vec<Self>> {
        value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(Self::new)
            .collect()
    }

    /// Returns the underlying identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ResourceId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Identifier of one election candidate.
///
/// Two sentinel values exist: [`LeaderId::no_leader`] when the store reports
/// the resource as unheld and [`LeaderId::unknown`] before an election has
/// completed or after an indeterminate store call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaderId(NonEmptyString);

impl LeaderId {
    /// Creates a leader identifier. The sentinel names map onto the sentinels.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        NonEmptyString::new(value)
            .map(Self)
            .map_err(|_| AppError::Validation("leader id must not be empty".to_owned()))
    }

    /// Creates an identifier usable as this process's own candidate identity.
    ///
    /// Rejects the sentinel names.
    pub fn candidate(value: impl Into<String>) -> AppResult<Self> {
        let leader_id = Self::new(value)?;
        if leader_id.is_sentinel() {
            return Err(AppError::Validation(format!(
                "leader id '{leader_id}' is reserved"
            )));
        }

        Ok(leader_id)
    }

    /// Sentinel for a resource that currently has no elected leader.
    #[must_use]
    pub fn no_leader() -> Self {
        Self::sentinel(NO_LEADER_ID)
    }

    /// Sentinel for a resource whose leader is not known locally.
    #[must_use]
    pub fn unknown() -> Self {
        Self::sentinel(UNKNOWN_LEADER_ID)
    }

    /// Returns true for [`LeaderId::no_leader`].
    #[must_use]
    pub fn is_no_leader(&self) -> bool {
        self.as_str() == NO_LEADER_ID
    }

    /// Returns true for [`LeaderId::unknown`].
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.as_str() == UNKNOWN_LEADER_ID
    }

    /// Returns true for either sentinel.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.is_no_leader() || self.is_unknown()
    }

    /// Returns the underlying identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn sentinel(value: &str) -> Self {
        match NonEmptyString::new(value) {
            Ok(value) => Self(value),
            Err(_) => unreachable!("sentinel leader ids are non-empty"),
        }
    }
}

impl Display for LeaderId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::org::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegationId(pub i64);

/// A time-bounded authorization for one user to act on another's behalf.
///
/// Several delegations may exist for the same `from_user`; only the
/// most-recently-created active one is authoritative at resolution time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub id: DelegationId,
    pub from_user: UserId,
    pub to_user: UserId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl Delegation {
    /// Active when not revoked and `starts_at <= now < ends_at`, all UTC.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.starts_at <= now && now < self.ends_at
    }
}

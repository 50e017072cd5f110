use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::domain::delegation::Delegation;
use crate::domain::org::UserId;

/// Upper bound on delegation hops, kept independently of cycle detection.
const MAX_HOPS: usize = 5;

/// Follows active personal-delegation chains to the effective assignee.
///
/// Built from a snapshot of delegation rows; resolution never fails. A
/// malformed graph (cycles, excessive chains) degrades to whichever user the
/// walk last reached, so callers can always act.
#[derive(Clone, Debug, Default)]
pub struct DelegationResolver {
    delegations: Vec<Delegation>,
}

impl DelegationResolver {
    pub fn new(delegations: Vec<Delegation>) -> Self {
        Self { delegations }
    }

    /// Effective assignee for `intended` at `now`.
    ///
    /// Repeatedly moves to the target of the most-recently-created active
    /// delegation out of the current user. Stops when no active delegation
    /// exists, when a user is revisited (the revisited user is returned), or
    /// after `MAX_HOPS` hops.
    pub fn resolve(&self, intended: UserId, now: DateTime<Utc>) -> UserId {
        let mut current = intended;
        let mut visited: HashSet<UserId> = HashSet::new();
        visited.insert(current);

        for _ in 0..MAX_HOPS {
            let Some(delegation) = self.active_delegation_from(current, now) else {
                return current;
            };

            current = delegation.to_user;
            if !visited.insert(current) {
                return current;
            }
        }

        current
    }

    fn active_delegation_from(&self, from: UserId, now: DateTime<Utc>) -> Option<&Delegation> {
        self.delegations
            .iter()
            .filter(|delegation| delegation.from_user == from && delegation.is_active_at(now))
            .max_by_key(|delegation| (delegation.created_at, delegation.id.0))
    }
}

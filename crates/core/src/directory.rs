use std::collections::{HashMap, HashSet};

use crate::domain::org::{Designation, DesignationId, ProjectId, ProjectMember, UserId, UserProfile};

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// In-memory organizational snapshot the resolvers work over.
///
/// The persistence layer loads one snapshot per inbound action; resolution
/// itself is pure and synchronous. Pending counts reflect the database at
/// load time only, so the tie-break they feed is advisory under concurrent
/// assignment and deterministic for a given snapshot.
#[derive(Clone, Debug, Default)]
pub struct OrgDirectory {
    users: Vec<UserProfile>,
    designation_names: HashMap<DesignationId, String>,
    project_members: HashMap<ProjectId, HashSet<String>>,
    pending_counts: HashMap<UserId, i64>,
}

impl OrgDirectory {
    pub fn new(
        users: Vec<UserProfile>,
        designations: Vec<Designation>,
        project_members: Vec<ProjectMember>,
        pending_counts: Vec<(UserId, i64)>,
    ) -> Self {
        let designation_names =
            designations.into_iter().map(|d| (d.id, d.name)).collect::<HashMap<_, _>>();

        let mut members: HashMap<ProjectId, HashSet<String>> = HashMap::new();
        for member in project_members {
            members.entry(member.project_id).or_default().insert(normalize_key(&member.email));
        }

        Self {
            users,
            designation_names,
            project_members: members,
            pending_counts: pending_counts.into_iter().collect(),
        }
    }

    pub fn user(&self, id: UserId) -> Option<&UserProfile> {
        self.users.iter().find(|user| user.id == id)
    }

    pub fn users_by_ids(&self, ids: &[UserId]) -> Vec<&UserProfile> {
        let wanted: HashSet<UserId> = ids.iter().copied().collect();
        self.users.iter().filter(|user| wanted.contains(&user.id)).collect()
    }

    pub fn users_with_designation(&self, designation: DesignationId) -> Vec<&UserProfile> {
        self.users.iter().filter(|user| user.designation_id == Some(designation)).collect()
    }

    /// Users whose designation's *name* matches, case-insensitive and
    /// trimmed. Supports the legacy name-keyed final-receiver channel.
    pub fn users_with_designation_named(&self, name: &str) -> Vec<&UserProfile> {
        let wanted = normalize_key(name);
        self.users
            .iter()
            .filter(|user| {
                user.designation_id
                    .and_then(|id| self.designation_names.get(&id))
                    .is_some_and(|designation| normalize_key(designation) == wanted)
            })
            .collect()
    }

    pub fn designation_name(&self, id: DesignationId) -> Option<&str> {
        self.designation_names.get(&id).map(String::as_str)
    }

    /// Designation held by the user with the given display name, if any.
    pub fn designation_of_username(&self, username: &str) -> Option<DesignationId> {
        let wanted = normalize_key(username);
        self.users
            .iter()
            .find(|user| normalize_key(&user.name) == wanted)
            .and_then(|user| user.designation_id)
    }

    pub fn is_project_member(&self, project: ProjectId, email: &str) -> bool {
        self.project_members
            .get(&project)
            .is_some_and(|members| members.contains(&normalize_key(email)))
    }

    pub fn pending_count(&self, user: UserId) -> i64 {
        self.pending_counts.get(&user).copied().unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::domain::org::DepartmentId;

    pub fn user(id: i64, name: &str, email: &str, designation: Option<i64>) -> UserProfile {
        UserProfile {
            id: UserId(id),
            name: name.to_string(),
            email: email.to_string(),
            designation_id: designation.map(DesignationId),
            department_id: None,
            project_id: None,
        }
    }

    pub fn user_in_department(
        id: i64,
        name: &str,
        email: &str,
        designation: i64,
        department: i64,
    ) -> UserProfile {
        UserProfile {
            department_id: Some(DepartmentId(department)),
            ..user(id, name, email, Some(designation))
        }
    }
}

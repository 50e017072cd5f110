use std::collections::HashSet;

use crate::directory::OrgDirectory;
use crate::domain::org::{DepartmentId, ProjectId, UserId, UserProfile};
use crate::domain::workflow::{Workflow, WorkflowFinalReceiver};

/// Computes the completion audience for a finished workflow.
///
/// Three independent candidate channels are unioned and de-duplicated by
/// user id (first occurrence wins), then ordered by (name, id). Final
/// receivers are a notification audience, so every channel is inclusive and
/// an empty result is returned rather than an error.
pub fn final_receivers(
    directory: &OrgDirectory,
    workflow: &Workflow,
    legacy_rows: &[WorkflowFinalReceiver],
    project: Option<ProjectId>,
    department: Option<DepartmentId>,
) -> Vec<UserProfile> {
    let scope = Scope { directory, project, department };

    let mut seen: HashSet<UserId> = HashSet::new();
    let mut merged: Vec<UserProfile> = Vec::new();
    for user in by_flagged_designation(directory, workflow, &scope)
        .into_iter()
        .chain(by_receiver_name(directory, workflow, legacy_rows, &scope))
        .chain(by_explicit_user_id(directory, legacy_rows, &scope))
    {
        if seen.insert(user.id) {
            merged.push(user.clone());
        }
    }

    merged.sort_by(|left, right| left.name.cmp(&right.name).then(left.id.cmp(&right.id)));
    merged
}

struct Scope<'a> {
    directory: &'a OrgDirectory,
    project: Option<ProjectId>,
    department: Option<DepartmentId>,
}

impl Scope<'_> {
    /// Department matches exactly; project matches through either the
    /// legacy direct column or email-mapped membership (union, not
    /// intersection).
    fn admits(&self, user: &UserProfile) -> bool {
        if let Some(department) = self.department {
            if user.department_id != Some(department) {
                return false;
            }
        }
        if let Some(project) = self.project {
            let direct = user.project_id == Some(project);
            let mapped = self.directory.is_project_member(project, &user.email);
            if !direct && !mapped {
                return false;
            }
        }
        true
    }
}

/// Channel 1: holders of a designation id flagged final-receiver on a step.
fn by_flagged_designation<'a>(
    directory: &'a OrgDirectory,
    workflow: &Workflow,
    scope: &Scope<'_>,
) -> Vec<&'a UserProfile> {
    workflow
        .steps
        .iter()
        .filter(|step| step.is_final_receiver)
        .filter_map(|step| step.designation_id)
        .flat_map(|designation| directory.users_with_designation(designation))
        .filter(|user| scope.admits(user))
        .collect()
}

/// Channel 2: holders of a designation *name*, whether the name comes from
/// a flagged step or a legacy per-workflow receiver row.
fn by_receiver_name<'a>(
    directory: &'a OrgDirectory,
    workflow: &Workflow,
    legacy_rows: &[WorkflowFinalReceiver],
    scope: &Scope<'_>,
) -> Vec<&'a UserProfile> {
    let step_names = workflow
        .steps
        .iter()
        .filter(|step| step.is_final_receiver)
        .filter_map(|step| step.designation_id)
        .filter_map(|designation| directory.designation_name(designation))
        .map(str::to_string);
    let legacy_names = legacy_rows.iter().filter_map(|row| row.receiver_name.clone());

    step_names
        .chain(legacy_names)
        .flat_map(|name| directory.users_with_designation_named(&name))
        .filter(|user| scope.admits(user))
        .collect()
}

/// Channel 3: users explicitly listed by id on legacy receiver rows.
fn by_explicit_user_id<'a>(
    directory: &'a OrgDirectory,
    legacy_rows: &[WorkflowFinalReceiver],
    scope: &Scope<'_>,
) -> Vec<&'a UserProfile> {
    let ids = legacy_rows.iter().filter_map(|row| row.user_id).collect::<Vec<_>>();
    directory.users_by_ids(&ids).into_iter().filter(|user| scope.admits(user)).collect()
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::directory::OrgDirectory;
use crate::domain::org::{DepartmentId, DesignationId, ProjectId, UserId, UserProfile};
use crate::domain::workflow::WorkflowStep;

/// Resolver knobs built from `AppConfig`, passed in explicitly rather than
/// read from ambient state.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RoutingOptions {
    /// Permit the designation-only global search when the scoped search is
    /// empty and no explicit project constrains the request.
    pub allow_fallback_lookup: bool,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self { allow_fallback_lookup: true }
    }
}

/// The concrete user who must act on a workflow step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAssignment {
    pub approver_id: UserId,
    pub approver_name: String,
    pub designation_id: DesignationId,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("initiator {user_id} holds no designation and cannot self-approve step `{step_name}`")]
    InitiatorWithoutDesignation { user_id: i64, step_name: String },
    #[error("initiator {user_id} does not exist")]
    InitiatorUnknown { user_id: i64 },
    #[error("step `{step_name}` has neither a designation nor a resolvable assigned user")]
    StepDesignationUnresolved { step_name: String },
    #[error("no approver holding designation {designation_id} found in project {project_id}")]
    NoCandidateInProject { designation_id: i64, project_id: i64 },
    #[error(
        "no approver found for designation {designation_id} (department: {department:?}, project: {project:?})"
    )]
    NoCandidate { designation_id: i64, department: Option<i64>, project: Option<i64> },
}

/// Finds the concrete approver for a workflow step: initiator
/// special-casing, designation determination, scoped-then-global candidate
/// search, least-busy tie-break. Read-only; the caller persists the
/// resulting approval row.
#[derive(Clone, Debug)]
pub struct ApproverResolver<'a> {
    directory: &'a OrgDirectory,
    options: RoutingOptions,
}

impl<'a> ApproverResolver<'a> {
    pub fn new(directory: &'a OrgDirectory, options: RoutingOptions) -> Self {
        Self { directory, options }
    }

    pub fn resolve(
        &self,
        step: &WorkflowStep,
        initiator: UserId,
        project: Option<ProjectId>,
        department: Option<DepartmentId>,
    ) -> Result<StepAssignment, RoutingError> {
        if step.is_initiator_step() {
            return self.resolve_initiator(step, initiator);
        }

        let designation = self.step_designation(step)?;

        if let Some(candidate) = self.scoped_candidate(designation, project, department) {
            return Ok(assignment(candidate, designation));
        }

        // An explicit project constraint must never be silently widened.
        if let Some(project) = project {
            return Err(RoutingError::NoCandidateInProject {
                designation_id: designation.0,
                project_id: project.0,
            });
        }

        if self.options.allow_fallback_lookup {
            if let Some(candidate) = self.global_candidate(designation) {
                return Ok(assignment(candidate, designation));
            }
        }

        Err(RoutingError::NoCandidate {
            designation_id: designation.0,
            department: department.map(|d| d.0),
            project: project.map(|p| p.0),
        })
    }

    fn resolve_initiator(
        &self,
        step: &WorkflowStep,
        initiator: UserId,
    ) -> Result<StepAssignment, RoutingError> {
        let user = self
            .directory
            .user(initiator)
            .ok_or(RoutingError::InitiatorUnknown { user_id: initiator.0 })?;
        let designation =
            user.designation_id.ok_or_else(|| RoutingError::InitiatorWithoutDesignation {
                user_id: initiator.0,
                step_name: step.name.clone(),
            })?;
        Ok(assignment(user, designation))
    }

    fn step_designation(&self, step: &WorkflowStep) -> Result<DesignationId, RoutingError> {
        step.designation_id
            .or_else(|| {
                step.assigned_user_name
                    .as_deref()
                    .and_then(|name| self.directory.designation_of_username(name))
            })
            .ok_or_else(|| RoutingError::StepDesignationUnresolved { step_name: step.name.clone() })
    }

    /// Designation holders within the request's scope: department when
    /// given, project membership (email-mapped) when given.
    fn scoped_candidate(
        &self,
        designation: DesignationId,
        project: Option<ProjectId>,
        department: Option<DepartmentId>,
    ) -> Option<&'a UserProfile> {
        let candidates = self
            .directory
            .users_with_designation(designation)
            .into_iter()
            .filter(|user| department.is_none() || user.department_id == department)
            .filter(|user| match project {
                Some(project) => self.directory.is_project_member(project, &user.email),
                None => true,
            })
            .collect();
        self.least_loaded(candidates)
    }

    /// Designation-only search across the whole organization.
    fn global_candidate(&self, designation: DesignationId) -> Option<&'a UserProfile> {
        self.least_loaded(self.directory.users_with_designation(designation))
    }

    /// Ascending (current pending-approval count, user id); the first entry
    /// is the least-loaded, lowest-id candidate. A load heuristic, not
    /// strict least-connections under concurrency.
    fn least_loaded(&self, mut candidates: Vec<&'a UserProfile>) -> Option<&'a UserProfile> {
        candidates.sort_by_key(|user| (self.directory.pending_count(user.id), user.id));
        candidates.into_iter().next()
    }
}

fn assignment(user: &UserProfile, designation: DesignationId) -> StepAssignment {
    StepAssignment {
        approver_id: user.id,
        approver_name: user.name.clone(),
        designation_id: designation,
    }
}

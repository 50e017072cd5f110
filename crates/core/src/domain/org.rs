use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DesignationId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepartmentId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub i64);

/// An organizational role/title ("Finance Manager") that determines
/// eligibility to act on a workflow step, independent of any specific user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Designation {
    pub id: DesignationId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub designation_id: Option<DesignationId>,
    pub department_id: Option<DepartmentId>,
    /// Legacy direct project column; project membership is normally carried
    /// by the email-keyed project mapping instead.
    pub project_id: Option<ProjectId>,
}

impl UserProfile {
    pub fn has_usable_email(&self) -> bool {
        !self.email.trim().is_empty()
    }
}

/// Project membership row, keyed by email rather than user id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMember {
    pub project_id: ProjectId,
    pub email: String,
}

use serde::{Deserialize, Serialize};

use crate::domain::org::{DesignationId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub i64);

/// One ordered stage of a workflow, bound to a designation.
///
/// The first step conventionally represents the initiator (a self-approval
/// marker, not a real actor). `sla_hours` is stored for reporting only; no
/// scheduler enforces it here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub workflow_id: WorkflowId,
    pub name: String,
    pub sequence: i32,
    pub sla_hours: Option<i32>,
    pub auto_approve: bool,
    pub is_final_receiver: bool,
    pub designation_id: Option<DesignationId>,
    pub assigned_user_name: Option<String>,
}

const INITIATOR_MARKERS: [&str; 2] = ["initiator", "default initiator"];

impl WorkflowStep {
    /// Whether this step denotes the request initiator rather than a
    /// designation-resolved actor.
    pub fn is_initiator_step(&self) -> bool {
        let matches_marker = |value: &str| {
            let normalized = value.trim().to_ascii_lowercase();
            INITIATOR_MARKERS.contains(&normalized.as_str())
        };
        matches_marker(&self.name)
            || self.assigned_user_name.as_deref().is_some_and(matches_marker)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    /// Steps ordered by ascending sequence.
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Step acting at the given level. Levels index the sequence-ordered
    /// step list, starting at 0.
    pub fn step_at(&self, level: i32) -> Option<&WorkflowStep> {
        usize::try_from(level).ok().and_then(|index| self.steps.get(index))
    }

    pub fn last_level(&self) -> i32 {
        self.steps.len().saturating_sub(1) as i32
    }

    pub fn is_last_level(&self, level: i32) -> bool {
        !self.steps.is_empty() && level >= self.last_level()
    }
}

/// Legacy per-workflow final-receiver row. Either a receiver name (matched
/// against designation names) or an explicit user id, occasionally both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowFinalReceiver {
    pub id: i64,
    pub workflow_id: WorkflowId,
    pub receiver_name: Option<String>,
    pub user_id: Option<UserId>,
}

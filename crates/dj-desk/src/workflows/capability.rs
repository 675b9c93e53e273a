//! Single authority for "may this user do this here" questions.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{DepartmentId, ProjectId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "department", rename_all = "snake_case")]
pub enum Role {
    Admin,
    DepartmentManager(DepartmentId),
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SubmitJob,
    DecideApproval,
    ConfigureFlow,
    EditAssignmentMatrix,
    AssignJob,
    WorkOnJob,
    ReviseJob,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::SubmitJob => "submit job",
            Action::DecideApproval => "decide approval",
            Action::ConfigureFlow => "configure approval flow",
            Action::EditAssignmentMatrix => "edit assignment matrix",
            Action::AssignJob => "assign job",
            Action::WorkOnJob => "work on job",
            Action::ReviseJob => "revise job",
        };
        f.write_str(label)
    }
}

/// Acting user together with the roles the directory reports for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    fn manages(&self, department: &DepartmentId) -> bool {
        self.roles
            .iter()
            .any(|role| matches!(role, Role::DepartmentManager(managed) if managed == department))
    }
}

/// What the action touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceScope {
    pub project_id: Option<ProjectId>,
    pub department_id: Option<DepartmentId>,
    pub approver_pool: Option<BTreeSet<UserId>>,
    pub requester_id: Option<UserId>,
    pub assignee_id: Option<UserId>,
}

impl ResourceScope {
    pub fn project(project_id: ProjectId, department_id: Option<DepartmentId>) -> Self {
        Self {
            project_id: Some(project_id),
            department_id,
            ..Self::default()
        }
    }

    pub fn with_pool(mut self, pool: BTreeSet<UserId>) -> Self {
        self.approver_pool = Some(pool);
        self
    }

    pub fn with_requester(mut self, requester_id: UserId) -> Self {
        self.requester_id = Some(requester_id);
        self
    }

    pub fn with_assignee(mut self, assignee_id: Option<UserId>) -> Self {
        self.assignee_id = assignee_id;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotInApproverPool,
    RequiresManager,
    NotAssignee,
    NotRequester,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(DenyReason),
}

impl Access {
    pub fn is_allowed(self) -> bool {
        matches!(self, Access::Allow)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityEvaluator;

impl CapabilityEvaluator {
    pub fn evaluate(&self, principal: &Principal, action: Action, scope: &ResourceScope) -> Access {
        match action {
            Action::SubmitJob => Access::Allow,
            // Pool membership is the only way to decide a level; admins included.
            Action::DecideApproval => match &scope.approver_pool {
                Some(pool) if pool.contains(&principal.user_id) => Access::Allow,
                _ => Access::Deny(DenyReason::NotInApproverPool),
            },
            Action::ConfigureFlow | Action::EditAssignmentMatrix | Action::AssignJob => {
                if principal.is_admin() || self.manages_scope(principal, scope) {
                    Access::Allow
                } else {
                    Access::Deny(DenyReason::RequiresManager)
                }
            }
            Action::WorkOnJob => {
                if principal.is_admin() || scope.assignee_id.as_ref() == Some(&principal.user_id) {
                    Access::Allow
                } else {
                    Access::Deny(DenyReason::NotAssignee)
                }
            }
            Action::ReviseJob => {
                if principal.is_admin() || scope.requester_id.as_ref() == Some(&principal.user_id)
                {
                    Access::Allow
                } else {
                    Access::Deny(DenyReason::NotRequester)
                }
            }
        }
    }

    fn manages_scope(&self, principal: &Principal, scope: &ResourceScope) -> bool {
        scope
            .department_id
            .as_ref()
            .is_some_and(|department| principal.manages(department))
    }
}

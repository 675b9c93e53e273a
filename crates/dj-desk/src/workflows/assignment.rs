use serde::Serialize;

use super::approval::{ApprovalFlow, ConfigurationError, JobTypeAssignment};
use super::domain::{Job, UserId};
use super::repository::{OrganizationDirectory, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    AssignmentMatrix,
    TeamLead,
    DepartmentManager,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub assignee_id: UserId,
    pub source: AssignmentSource,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssignmentError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Directory(#[from] RepositoryError),
}

/// Picks the worker a cleared job is handed to.
///
/// Precedence, first match wins:
/// 1. skip-flow: the assignment matrix entry (mandatory),
/// 2. `include_team_lead` with a team lead set: the team lead,
/// 3. `include_team_lead` without one: the manager of the project's department,
/// 4. nobody; an admin or department manager assigns by hand.
#[derive(Debug, Clone, Default)]
pub struct AutoAssignmentResolver {
    matrix: Vec<JobTypeAssignment>,
}

impl AutoAssignmentResolver {
    pub fn new(matrix: Vec<JobTypeAssignment>) -> Self {
        Self { matrix }
    }

    pub fn assign<D>(
        &self,
        flow: &ApprovalFlow,
        job: &Job,
        directory: &D,
    ) -> Result<Option<Assignment>, AssignmentError>
    where
        D: OrganizationDirectory + ?Sized,
    {
        if flow.skip_approval {
            let row = self
                .matrix
                .iter()
                .find(|row| row.project_id == job.project_id && row.job_type_id == job.job_type_id)
                .ok_or_else(|| ConfigurationError::MissingAssignment {
                    project_id: job.project_id.clone(),
                    job_type_id: job.job_type_id.clone(),
                })?;
            return Ok(Some(Assignment {
                assignee_id: row.assignee_id.clone(),
                source: AssignmentSource::AssignmentMatrix,
            }));
        }

        if !flow.include_team_lead {
            return Ok(None);
        }

        if let Some(team_lead_id) = &flow.team_lead_id {
            return Ok(Some(Assignment {
                assignee_id: team_lead_id.clone(),
                source: AssignmentSource::TeamLead,
            }));
        }

        let manager = match directory.department_for_project(&job.project_id)? {
            Some(department_id) => directory.department_manager(&department_id)?,
            None => None,
        };

        Ok(manager.map(|assignee_id| Assignment {
            assignee_id,
            source: AssignmentSource::DepartmentManager,
        }))
    }
}

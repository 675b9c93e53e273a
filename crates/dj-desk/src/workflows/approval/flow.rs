use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::workflows::domain::{JobTypeId, ProjectId, UserId};

/// How a level's approver pool reaches a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLogic {
    /// First approval from any pool member completes the level.
    #[default]
    Any,
    /// Every pool member has to approve.
    All,
}

/// One sequential approval stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLevel {
    pub level: u32,
    #[serde(default)]
    pub approvers: BTreeSet<UserId>,
    #[serde(default)]
    pub logic: ApprovalLogic,
}

/// Approval configuration for a project default (`job_type_id == None`) or a
/// per-job-type skip override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalFlow {
    pub project_id: ProjectId,
    #[serde(default)]
    pub job_type_id: Option<JobTypeId>,
    #[serde(default)]
    pub skip_approval: bool,
    #[serde(default)]
    pub levels: Vec<ApprovalLevel>,
    #[serde(default)]
    pub include_team_lead: bool,
    #[serde(default)]
    pub team_lead_id: Option<UserId>,
    /// Only active flows route jobs.
    #[serde(default)]
    pub active: bool,
}

/// Row of the per-project, per-job-type default assignee matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTypeAssignment {
    pub project_id: ProjectId,
    pub job_type_id: JobTypeId,
    pub assignee_id: UserId,
}

impl ApprovalFlow {
    /// Inactive default flow with no levels yet.
    pub fn leveled(project_id: ProjectId) -> Self {
        Self {
            project_id,
            job_type_id: None,
            skip_approval: false,
            levels: Vec::new(),
            include_team_lead: false,
            team_lead_id: None,
            active: false,
        }
    }

    pub fn skip(project_id: ProjectId, job_type_id: JobTypeId) -> Self {
        Self {
            project_id,
            job_type_id: Some(job_type_id),
            skip_approval: true,
            levels: Vec::new(),
            include_team_lead: false,
            team_lead_id: None,
            active: false,
        }
    }

    pub fn with_team_lead(mut self, team_lead_id: Option<UserId>) -> Self {
        self.include_team_lead = true;
        self.team_lead_id = team_lead_id;
        self
    }

    pub fn activated(mut self) -> Self {
        self.active = true;
        self
    }

    pub fn is_default(&self) -> bool {
        self.job_type_id.is_none()
    }

    pub fn level(&self, level: u32) -> Option<&ApprovalLevel> {
        self.levels.iter().find(|entry| entry.level == level)
    }

    pub fn final_level(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Append a level and return its number.
    pub fn add_level<I>(&mut self, logic: ApprovalLogic, approvers: I) -> u32
    where
        I: IntoIterator<Item = UserId>,
    {
        let level = self.final_level() + 1;
        self.levels.push(ApprovalLevel {
            level,
            approvers: approvers.into_iter().collect(),
            logic,
        });
        level
    }

    /// Remove a level; later levels move up so numbering stays contiguous.
    pub fn remove_level(&mut self, level: u32) -> Result<ApprovalLevel, ConfigurationError> {
        let index = self.level_index(level)?;
        let removed = self.levels.remove(index);
        self.renumber();
        Ok(removed)
    }

    pub fn add_approver(&mut self, level: u32, approver: UserId) -> Result<(), ConfigurationError> {
        let index = self.level_index(level)?;
        self.levels[index].approvers.insert(approver);
        Ok(())
    }

    pub fn remove_approver(
        &mut self,
        level: u32,
        approver: &UserId,
    ) -> Result<bool, ConfigurationError> {
        let index = self.level_index(level)?;
        Ok(self.levels[index].approvers.remove(approver))
    }

    pub fn set_logic(&mut self, level: u32, logic: ApprovalLogic) -> Result<(), ConfigurationError> {
        let index = self.level_index(level)?;
        self.levels[index].logic = logic;
        Ok(())
    }

    /// Order levels by their declared number and renumber them `1..=n`.
    pub fn normalize(&mut self) {
        self.levels.sort_by_key(|entry| entry.level);
        self.renumber();
    }

    fn renumber(&mut self) {
        for (index, entry) in self.levels.iter_mut().enumerate() {
            entry.level = index as u32 + 1;
        }
    }

    fn level_index(&self, level: u32) -> Result<usize, ConfigurationError> {
        self.levels
            .iter()
            .position(|entry| entry.level == level)
            .ok_or_else(|| ConfigurationError::UnknownLevel {
                project_id: self.project_id.clone(),
                level,
            })
    }

    /// Save-time validation against the project's assignment matrix.
    pub fn validate(&self, matrix: &[JobTypeAssignment]) -> Result<(), ConfigurationError> {
        if self.skip_approval {
            let job_type_id = self.job_type_id.as_ref().ok_or_else(|| {
                ConfigurationError::SkipFlowWithoutJobType {
                    project_id: self.project_id.clone(),
                }
            })?;

            let covered = matrix.iter().any(|row| {
                row.project_id == self.project_id && &row.job_type_id == job_type_id
            });
            if !covered {
                return Err(ConfigurationError::MissingAssignment {
                    project_id: self.project_id.clone(),
                    job_type_id: job_type_id.clone(),
                });
            }
            return Ok(());
        }

        if let Some(job_type_id) = &self.job_type_id {
            return Err(ConfigurationError::LeveledFlowScopedToJobType {
                project_id: self.project_id.clone(),
                job_type_id: job_type_id.clone(),
            });
        }

        if !self.active {
            return Ok(());
        }

        if self.levels.is_empty() {
            return Err(ConfigurationError::NoLevels {
                project_id: self.project_id.clone(),
            });
        }

        for (index, entry) in self.levels.iter().enumerate() {
            if entry.level != index as u32 + 1 {
                return Err(ConfigurationError::NonContiguousLevels {
                    project_id: self.project_id.clone(),
                });
            }
            if entry.approvers.is_empty() {
                return Err(ConfigurationError::EmptyApproverPool {
                    project_id: self.project_id.clone(),
                    level: entry.level,
                });
            }
        }

        Ok(())
    }
}

/// Check a replacement matrix for one project before it is stored.
pub fn validate_matrix(
    project_id: &ProjectId,
    rows: &[JobTypeAssignment],
    flows: &[ApprovalFlow],
) -> Result<(), ConfigurationError> {
    let mut seen = HashSet::new();
    for row in rows {
        if &row.project_id != project_id {
            return Err(ConfigurationError::ForeignMatrixRow {
                project_id: project_id.clone(),
                row_project_id: row.project_id.clone(),
            });
        }
        if !seen.insert(&row.job_type_id) {
            return Err(ConfigurationError::DuplicateMatrixRow {
                project_id: project_id.clone(),
                job_type_id: row.job_type_id.clone(),
            });
        }
    }

    for flow in flows
        .iter()
        .filter(|flow| flow.skip_approval && &flow.project_id == project_id)
    {
        if let Some(job_type_id) = &flow.job_type_id {
            if !seen.contains(job_type_id) {
                return Err(ConfigurationError::MatrixRowBacksSkipFlow {
                    project_id: project_id.clone(),
                    job_type_id: job_type_id.clone(),
                });
            }
        }
    }

    Ok(())
}

/// A flow or matrix that cannot be used to route real jobs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("level {level} of the approval flow for project {project_id} has no approvers")]
    EmptyApproverPool { project_id: ProjectId, level: u32 },
    #[error("the approval flow for project {project_id} has no levels")]
    NoLevels { project_id: ProjectId },
    #[error("approval levels for project {project_id} must be numbered 1..n without gaps")]
    NonContiguousLevels { project_id: ProjectId },
    #[error("project {project_id} has no level {level}")]
    UnknownLevel { project_id: ProjectId, level: u32 },
    #[error(
        "job type {job_type_id} in project {project_id} has no assignee in the assignment matrix"
    )]
    MissingAssignment {
        project_id: ProjectId,
        job_type_id: JobTypeId,
    },
    #[error("a skip-approval flow for project {project_id} must name a job type")]
    SkipFlowWithoutJobType { project_id: ProjectId },
    #[error(
        "the leveled flow for project {project_id} is the project default and cannot target job type {job_type_id}"
    )]
    LeveledFlowScopedToJobType {
        project_id: ProjectId,
        job_type_id: JobTypeId,
    },
    #[error("job type {job_type_id} appears more than once in the matrix for project {project_id}")]
    DuplicateMatrixRow {
        project_id: ProjectId,
        job_type_id: JobTypeId,
    },
    #[error("matrix for project {project_id} contains a row for project {row_project_id}")]
    ForeignMatrixRow {
        project_id: ProjectId,
        row_project_id: ProjectId,
    },
    #[error(
        "job type {job_type_id} in project {project_id} skips approval; its matrix row cannot be removed"
    )]
    MatrixRowBacksSkipFlow {
        project_id: ProjectId,
        job_type_id: JobTypeId,
    },
}

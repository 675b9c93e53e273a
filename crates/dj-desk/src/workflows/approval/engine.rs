use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::flow::{ApprovalFlow, ApprovalLogic};
use crate::workflows::capability::{Action, CapabilityEvaluator, Principal, ResourceScope};
use crate::workflows::domain::{Job, JobId, JobStatus, JobTypeId, ProjectId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

/// Which flow a new job follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub skip: bool,
    pub flow: ApprovalFlow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub level: u32,
    pub approver_id: UserId,
    pub decision: Decision,
}

/// Approval state carried on a job: the flow as it was when the job entered
/// approval, plus every decision recorded against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalProgress {
    pub flow: ApprovalFlow,
    pub approvals: BTreeMap<u32, BTreeSet<UserId>>,
    pub history: Vec<DecisionRecord>,
}

impl ApprovalProgress {
    fn new(flow: ApprovalFlow) -> Self {
        Self {
            flow,
            approvals: BTreeMap::new(),
            history: Vec::new(),
        }
    }
}

/// Result of recording one approver's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LevelOutcome {
    /// ALL-logic level still waiting on the listed approvers.
    Recorded {
        level: u32,
        remaining: BTreeSet<UserId>,
    },
    Advanced {
        completed_level: u32,
        next_level: u32,
    },
    /// Final level done; the job is `Approved`.
    FlowCompleted { completed_level: u32 },
    /// The job went to `Rework`.
    Rejected { level: u32 },
    /// The level was already decided by someone else; nothing changed.
    AlreadySettled { level: u32 },
}

impl LevelOutcome {
    pub fn changed_job(&self) -> bool {
        !matches!(self, LevelOutcome::AlreadySettled { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error(
        "no approval flow is configured for job type {job_type_id} in project {project_id}; configure a default or skip flow first"
    )]
    NoFlow {
        project_id: ProjectId,
        job_type_id: JobTypeId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    #[error("{approver_id} is not in the approver pool for level {level} of job {job_id}")]
    NotInPool {
        job_id: JobId,
        level: u32,
        approver_id: UserId,
    },
    #[error("job {job_id} is at level {current}, level {requested} is not open yet")]
    LevelNotActive {
        job_id: JobId,
        requested: u32,
        current: u32,
    },
    #[error("job {job_id} is not awaiting approval ({status})")]
    NotAwaitingApproval { job_id: JobId, status: JobStatus },
    #[error("job {job_id} has no approval flow snapshot")]
    MissingProgress { job_id: JobId },
}

/// Routes jobs to flows and folds approver decisions into job state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalFlowEngine {
    capabilities: CapabilityEvaluator,
}

impl ApprovalFlowEngine {
    pub fn new(capabilities: CapabilityEvaluator) -> Self {
        Self { capabilities }
    }

    /// An active skip-flow for the job type wins over the project's default flow.
    pub fn route(
        &self,
        flows: &[ApprovalFlow],
        project_id: &ProjectId,
        job_type_id: &JobTypeId,
    ) -> Result<RouteDecision, RoutingError> {
        let in_project = || {
            flows
                .iter()
                .filter(move |flow| flow.active && &flow.project_id == project_id)
        };

        if let Some(flow) = in_project()
            .find(|flow| flow.skip_approval && flow.job_type_id.as_ref() == Some(job_type_id))
        {
            return Ok(RouteDecision {
                skip: true,
                flow: flow.clone(),
            });
        }

        if let Some(flow) = in_project().find(|flow| !flow.skip_approval && flow.is_default()) {
            return Ok(RouteDecision {
                skip: false,
                flow: flow.clone(),
            });
        }

        Err(RoutingError::NoFlow {
            project_id: project_id.clone(),
            job_type_id: job_type_id.clone(),
        })
    }

    /// Put a job at level 1 of `flow` with a fresh decision history.
    pub fn start(&self, job: &mut Job, flow: ApprovalFlow) {
        job.status = JobStatus::PendingApproval { level: 1 };
        job.approval = Some(ApprovalProgress::new(flow));
    }

    pub fn record_decision(
        &self,
        job: &mut Job,
        level: u32,
        approver: &Principal,
        decision: Decision,
    ) -> Result<LevelOutcome, ApprovalError> {
        let current = match job.status {
            JobStatus::PendingApproval { level } => level,
            JobStatus::Draft => {
                return Err(ApprovalError::NotAwaitingApproval {
                    job_id: job.id.clone(),
                    status: job.status,
                })
            }
            // Approved, rejected, or assigned since this decision was made.
            _ => return Ok(LevelOutcome::AlreadySettled { level }),
        };

        if level < current {
            return Ok(LevelOutcome::AlreadySettled { level });
        }
        if level > current {
            return Err(ApprovalError::LevelNotActive {
                job_id: job.id.clone(),
                requested: level,
                current,
            });
        }

        let job_id = job.id.clone();
        let project_id = job.project_id.clone();
        let progress = job
            .approval
            .as_mut()
            .ok_or_else(|| ApprovalError::MissingProgress {
                job_id: job_id.clone(),
            })?;
        let stage = progress
            .flow
            .level(level)
            .cloned()
            .ok_or_else(|| ApprovalError::MissingProgress {
                job_id: job_id.clone(),
            })?;

        let scope = ResourceScope::project(project_id, None).with_pool(stage.approvers.clone());
        if !self
            .capabilities
            .evaluate(approver, Action::DecideApproval, &scope)
            .is_allowed()
        {
            return Err(ApprovalError::NotInPool {
                job_id,
                level,
                approver_id: approver.user_id.clone(),
            });
        }

        progress.history.push(DecisionRecord {
            level,
            approver_id: approver.user_id.clone(),
            decision,
        });

        if decision == Decision::Reject {
            job.status = JobStatus::Rework;
            return Ok(LevelOutcome::Rejected { level });
        }

        let approvals = progress.approvals.entry(level).or_default();
        approvals.insert(approver.user_id.clone());

        let complete = match stage.logic {
            ApprovalLogic::Any => true,
            ApprovalLogic::All => stage.approvers.is_subset(approvals),
        };

        if !complete {
            let remaining = stage.approvers.difference(approvals).cloned().collect();
            return Ok(LevelOutcome::Recorded { level, remaining });
        }

        if level >= progress.flow.final_level() {
            job.status = JobStatus::Approved;
            Ok(LevelOutcome::FlowCompleted {
                completed_level: level,
            })
        } else {
            job.status = JobStatus::PendingApproval { level: level + 1 };
            Ok(LevelOutcome::Advanced {
                completed_level: level,
                next_level: level + 1,
            })
        }
    }
}

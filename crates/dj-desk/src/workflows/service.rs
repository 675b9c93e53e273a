use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::approval::{
    validate_matrix, ApprovalError, ApprovalFlow, ApprovalFlowEngine, ConfigurationError,
    Decision, JobTypeAssignment, LevelOutcome, RoutingError,
};
use super::assignment::{Assignment, AssignmentError, AssignmentSource, AutoAssignmentResolver};
use super::calendar::HolidayCalendar;
use super::capability::{
    Access, Action, CapabilityEvaluator, DenyReason, Principal, ResourceScope,
};
use super::domain::{Job, JobId, JobStatus, JobTypeId, Priority, ProjectId, SlaShiftLog, UserId};
use super::repository::{
    NotificationDispatcher, NotificationEvent, NotificationEventType, RepositoryError,
    WorkflowStore,
};
use super::scheduling::{ShiftReport, UrgentJobScheduler};
use crate::config::SchedulingConfig;

const MAX_DECISION_ATTEMPTS: usize = 3;

static JOB_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_job_id() -> JobId {
    let id = JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    JobId(format!("dj-{id:06}"))
}

/// New design job as submitted by a requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub project_id: ProjectId,
    pub job_type_id: JobTypeId,
    pub title: String,
    pub requester_id: UserId,
    #[serde(default)]
    pub priority: Priority,
    /// Defaults to the configured SLA counted in working days from submission.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub submitted_on: Option<NaiveDate>,
}

/// Result of a command that may assign the job and trigger the urgent cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobUpdate {
    pub job: Job,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<LevelOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<ShiftReport>,
}

impl JobUpdate {
    fn new(job: Job) -> Self {
        Self {
            job,
            outcome: None,
            assignment: None,
            shift: None,
        }
    }
}

/// Application layer over the approval engine, assignment resolver, and scheduler.
pub struct DesignJobService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    engine: ApprovalFlowEngine,
    capabilities: CapabilityEvaluator,
    scheduling: SchedulingConfig,
}

impl<S, N> DesignJobService<S, N>
where
    S: WorkflowStore + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, scheduling: SchedulingConfig) -> Self {
        let capabilities = CapabilityEvaluator;
        Self {
            store,
            notifier,
            engine: ApprovalFlowEngine::new(capabilities),
            capabilities,
            scheduling,
        }
    }

    /// Validate and store a flow. Levels are renumbered before validation.
    pub fn save_flow(
        &self,
        actor_id: &UserId,
        mut flow: ApprovalFlow,
    ) -> Result<ApprovalFlow, WorkflowError> {
        let scope = self.project_scope(&flow.project_id)?;
        self.authorize(actor_id, Action::ConfigureFlow, &scope)?;

        flow.normalize();
        let matrix = self.store.load_assignment_matrix(&flow.project_id)?;
        flow.validate(&matrix)?;
        self.store.save_approval_flow(flow.clone())?;

        info!(
            project = %flow.project_id,
            job_type = ?flow.job_type_id,
            skip = flow.skip_approval,
            levels = flow.levels.len(),
            active = flow.active,
            "approval flow saved"
        );
        Ok(flow)
    }

    pub fn save_assignment_matrix(
        &self,
        actor_id: &UserId,
        project_id: &ProjectId,
        rows: Vec<JobTypeAssignment>,
    ) -> Result<Vec<JobTypeAssignment>, WorkflowError> {
        let scope = self.project_scope(project_id)?;
        self.authorize(actor_id, Action::EditAssignmentMatrix, &scope)?;

        let flows = self.store.load_approval_flows(Some(project_id))?;
        validate_matrix(project_id, &rows, &flows)?;
        self.store.save_assignment_matrix(project_id, rows.clone())?;

        info!(project = %project_id, rows = rows.len(), "assignment matrix saved");
        Ok(rows)
    }

    pub fn flows(&self, project_id: &ProjectId) -> Result<Vec<ApprovalFlow>, WorkflowError> {
        Ok(self.store.load_approval_flows(Some(project_id))?)
    }

    /// Route and store a new job. Skip-routed jobs are assigned immediately; urgent
    /// jobs with an assignee shift the assignee's other deadlines before returning.
    pub fn create_job(
        &self,
        request: CreateJobRequest,
        today: NaiveDate,
    ) -> Result<JobUpdate, WorkflowError> {
        let flows = self.store.load_approval_flows(Some(&request.project_id))?;
        let route = self
            .engine
            .route(&flows, &request.project_id, &request.job_type_id)?;
        let calendar = self.calendar()?;

        let submitted_on = request.submitted_on.unwrap_or(today);
        let due_date = match request.due_date {
            Some(due_date) => due_date,
            None => calendar
                .add_working_days(submitted_on, self.scheduling.default_sla_days)
                .ok_or(WorkflowError::DueDateOutOfRange { submitted_on })?,
        };

        let mut job = Job {
            id: next_job_id(),
            project_id: request.project_id,
            job_type_id: request.job_type_id,
            title: request.title,
            requester_id: request.requester_id,
            priority: request.priority,
            status: JobStatus::Draft,
            created_on: submitted_on,
            due_date,
            original_due_date: None,
            shifted_by_job_id: None,
            assignee_id: None,
            approval: None,
            version: 0,
        };

        let skip = route.skip;
        let assignment = if skip {
            Some(self.assign_from_matrix(&mut job, &route.flow)?)
        } else {
            self.engine.start(&mut job, route.flow);
            None
        };

        let job = self.store.insert_job(job)?;
        info!(
            job = %job.id,
            project = %job.project_id,
            job_type = %job.job_type_id,
            priority = ?job.priority,
            status = %job.status,
            skip,
            "design job created"
        );

        self.dispatch(
            NotificationEvent::new(NotificationEventType::JobCreated, job.id.clone())
                .with("project_id", &job.project_id)
                .with("job_type_id", &job.job_type_id)
                .with("status", job.status)
                .with("due_date", job.due_date),
        );

        let mut update = JobUpdate::new(job);
        if let Some(assignment) = assignment {
            self.dispatch_assigned(&update.job, &assignment);
            update.shift = self.cascade(&update.job, Some(&calendar));
            update.assignment = Some(assignment);
        }
        Ok(update)
    }

    /// Record one approver's decision on the job's open level.
    ///
    /// The write is compare-and-set on the job version. When another decision landed
    /// first the job is re-read and the decision re-evaluated, so a second approval
    /// on an already completed level resolves to [`LevelOutcome::AlreadySettled`].
    /// Holidays for an urgent job's cascade are read before the write, so a failed
    /// read leaves the decision unrecorded and safe to send again.
    pub fn record_decision(
        &self,
        job_id: &JobId,
        approver_id: &UserId,
        level: u32,
        decision: Decision,
    ) -> Result<JobUpdate, WorkflowError> {
        let principal = self.principal(approver_id)?;
        let mut attempt = 0;

        let (outcome, job, assignment, calendar) = loop {
            attempt += 1;
            let stored = self.fetch(job_id)?;
            let mut working = stored.clone();
            let outcome = self
                .engine
                .record_decision(&mut working, level, &principal, decision)?;

            if !outcome.changed_job() {
                debug!(job = %job_id, level, approver = %approver_id, "decision on settled level ignored");
                let mut update = JobUpdate::new(stored);
                update.outcome = Some(outcome);
                return Ok(update);
            }

            let assignment = if matches!(outcome, LevelOutcome::FlowCompleted { .. }) {
                self.assign_after_approval(&mut working)?
            } else {
                None
            };
            let calendar = self.cascade_calendar(&working)?;

            match self.store.update_job(working) {
                Ok(saved) => break (outcome, saved, assignment, calendar),
                Err(RepositoryError::Stale) if attempt < MAX_DECISION_ATTEMPTS => {
                    debug!(job = %job_id, attempt, "job changed concurrently; re-evaluating decision");
                }
                Err(err) => return Err(err.into()),
            }
        };

        info!(job = %job.id, level, approver = %approver_id, outcome = ?outcome, "approval decision recorded");

        match &outcome {
            LevelOutcome::Rejected { level } => self.dispatch(
                NotificationEvent::new(NotificationEventType::JobRejected, job.id.clone())
                    .with("level", level)
                    .with("approver_id", approver_id)
                    .with("returned_to", &job.requester_id),
            ),
            LevelOutcome::FlowCompleted { completed_level } => self.dispatch(
                NotificationEvent::new(NotificationEventType::JobApproved, job.id.clone())
                    .with("final_level", completed_level)
                    .with("approver_id", approver_id),
            ),
            _ => {}
        }

        let mut update = JobUpdate::new(job);
        update.outcome = Some(outcome);
        if let Some(assignment) = assignment {
            self.dispatch_assigned(&update.job, &assignment);
            update.shift = self.cascade(&update.job, calendar.as_ref());
            update.assignment = Some(assignment);
        } else if matches!(update.outcome, Some(LevelOutcome::FlowCompleted { .. })) {
            info!(job = %update.job.id, "approved job awaits manual assignment");
        }
        Ok(update)
    }

    /// Hand an approved job to a worker chosen by an admin or department manager.
    pub fn assign_manually(
        &self,
        actor_id: &UserId,
        job_id: &JobId,
        assignee_id: UserId,
    ) -> Result<JobUpdate, WorkflowError> {
        let job = self.fetch(job_id)?;
        let scope = self.project_scope(&job.project_id)?;
        self.authorize(actor_id, Action::AssignJob, &scope)?;

        let mut working = job;
        transition(&mut working, JobStatus::Assigned)?;
        working.assignee_id = Some(assignee_id.clone());
        let calendar = self.cascade_calendar(&working)?;
        let saved = self.store.update_job(working)?;

        let assignment = Assignment {
            assignee_id,
            source: AssignmentSource::Manual,
        };
        self.dispatch_assigned(&saved, &assignment);

        let mut update = JobUpdate::new(saved);
        update.shift = self.cascade(&update.job, calendar.as_ref());
        update.assignment = Some(assignment);
        Ok(update)
    }

    /// Send a job in `Rework` back through routing with a fresh approval history.
    pub fn resubmit(&self, actor_id: &UserId, job_id: &JobId) -> Result<JobUpdate, WorkflowError> {
        let job = self.fetch(job_id)?;
        self.authorize_requester(actor_id, &job)?;
        if job.status != JobStatus::Rework {
            return Err(WorkflowError::InvalidTransition {
                job_id: job.id.clone(),
                from: job.status,
                to: JobStatus::PendingApproval { level: 1 },
            });
        }

        let flows = self.store.load_approval_flows(Some(&job.project_id))?;
        let route = self.engine.route(&flows, &job.project_id, &job.job_type_id)?;

        let mut working = job;
        let assignment = if route.skip {
            Some(self.assign_from_matrix(&mut working, &route.flow)?)
        } else {
            self.engine.start(&mut working, route.flow);
            None
        };
        let calendar = self.cascade_calendar(&working)?;
        let saved = self.store.update_job(working)?;
        info!(job = %saved.id, status = %saved.status, "design job resubmitted");

        self.dispatch(
            NotificationEvent::new(NotificationEventType::JobCreated, saved.id.clone())
                .with("resubmitted", true)
                .with("status", saved.status),
        );

        let mut update = JobUpdate::new(saved);
        if let Some(assignment) = assignment {
            self.dispatch_assigned(&update.job, &assignment);
            update.shift = self.cascade(&update.job, calendar.as_ref());
            update.assignment = Some(assignment);
        }
        Ok(update)
    }

    /// Requester gives up on a job awaiting approval or rework.
    pub fn withdraw(&self, actor_id: &UserId, job_id: &JobId) -> Result<Job, WorkflowError> {
        let job = self.fetch(job_id)?;
        self.authorize_requester(actor_id, &job)?;

        let mut working = job;
        transition(&mut working, JobStatus::Rejected)?;
        let saved = self.store.update_job(working)?;
        self.dispatch(
            NotificationEvent::new(NotificationEventType::JobRejected, saved.id.clone())
                .with("reason", "withdrawn")
                .with("actor_id", actor_id),
        );
        Ok(saved)
    }

    pub fn start_work(&self, actor_id: &UserId, job_id: &JobId) -> Result<Job, WorkflowError> {
        let job = self.fetch(job_id)?;
        self.authorize_assignee(actor_id, &job)?;

        let mut working = job;
        transition(&mut working, JobStatus::InProgress)?;
        Ok(self.store.update_job(working)?)
    }

    pub fn complete(&self, actor_id: &UserId, job_id: &JobId) -> Result<Job, WorkflowError> {
        let job = self.fetch(job_id)?;
        self.authorize_assignee(actor_id, &job)?;

        let mut working = job;
        transition(&mut working, JobStatus::Completed)?;
        let saved = self.store.update_job(working)?;
        self.dispatch(
            NotificationEvent::new(NotificationEventType::JobCompleted, saved.id.clone())
                .with("completed_by", actor_id),
        );
        Ok(saved)
    }

    pub fn get(&self, job_id: &JobId) -> Result<Job, WorkflowError> {
        self.fetch(job_id)
    }

    pub fn shift_log(&self, job_id: &JobId) -> Result<Vec<SlaShiftLog>, WorkflowError> {
        self.fetch(job_id)?;
        Ok(self.store.shift_log(job_id)?)
    }

    /// Re-run an urgent job's cascade, limited to `only` when given. Peers the job
    /// already moved are skipped, so a retry never shifts anyone twice.
    pub fn retry_shift(
        &self,
        urgent_job_id: &JobId,
        only: Option<BTreeSet<JobId>>,
    ) -> Result<ShiftReport, WorkflowError> {
        let urgent = self.fetch(urgent_job_id)?;
        let calendar = self.calendar()?;
        let scheduler = UrgentJobScheduler::new(&calendar, self.scheduling.urgent_shift_days);
        let report = match only {
            Some(ids) => scheduler.retry_failed(
                &urgent,
                &ids,
                self.store.as_ref(),
                self.notifier.as_ref(),
            )?,
            None => scheduler.shift(&urgent, self.store.as_ref(), self.notifier.as_ref())?,
        };
        Ok(report)
    }

    pub fn calendar(&self) -> Result<HolidayCalendar, WorkflowError> {
        Ok(HolidayCalendar::from_holidays(self.store.load_holidays()?))
    }

    fn fetch(&self, job_id: &JobId) -> Result<Job, WorkflowError> {
        Ok(self
            .store
            .fetch_job(job_id)?
            .ok_or(RepositoryError::NotFound)?)
    }

    fn assign_from_matrix(
        &self,
        job: &mut Job,
        flow: &ApprovalFlow,
    ) -> Result<Assignment, WorkflowError> {
        let resolver = AutoAssignmentResolver::new(self.store.load_assignment_matrix(&job.project_id)?);
        let assignment = resolver
            .assign(flow, job, self.store.as_ref())?
            .ok_or_else(|| ConfigurationError::MissingAssignment {
                project_id: job.project_id.clone(),
                job_type_id: job.job_type_id.clone(),
            })?;
        transition(job, JobStatus::Assigned)?;
        job.assignee_id = Some(assignment.assignee_id.clone());
        Ok(assignment)
    }

    fn assign_after_approval(&self, job: &mut Job) -> Result<Option<Assignment>, WorkflowError> {
        let Some(flow) = job.approval.as_ref().map(|progress| progress.flow.clone()) else {
            return Ok(None);
        };

        let matrix = if flow.skip_approval {
            self.store.load_assignment_matrix(&job.project_id)?
        } else {
            Vec::new()
        };
        let assignment = AutoAssignmentResolver::new(matrix).assign(&flow, job, self.store.as_ref())?;

        if let Some(assignment) = &assignment {
            transition(job, JobStatus::Assigned)?;
            job.assignee_id = Some(assignment.assignee_id.clone());
        }
        Ok(assignment)
    }

    /// Holidays for the cascade `job` will start once saved; `None` when it starts none.
    fn cascade_calendar(&self, job: &Job) -> Result<Option<HolidayCalendar>, WorkflowError> {
        if job.is_urgent() && job.assignee_id.is_some() {
            Ok(Some(self.calendar()?))
        } else {
            Ok(None)
        }
    }

    fn cascade(&self, job: &Job, calendar: Option<&HolidayCalendar>) -> Option<ShiftReport> {
        let calendar = calendar?;
        if !job.is_urgent() || job.assignee_id.is_none() {
            return None;
        }

        let scheduler = UrgentJobScheduler::new(calendar, self.scheduling.urgent_shift_days);
        match scheduler.shift(job, self.store.as_ref(), self.notifier.as_ref()) {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(
                    job = %job.id,
                    error = %err,
                    "urgent shift cascade could not load the assignee queue"
                );
                Some(ShiftReport::aborted(err.to_string()))
            }
        }
    }

    fn principal(&self, user_id: &UserId) -> Result<Principal, WorkflowError> {
        let roles = self.store.roles_for(user_id)?;
        Ok(Principal::new(user_id.clone(), roles))
    }

    fn project_scope(&self, project_id: &ProjectId) -> Result<ResourceScope, WorkflowError> {
        let department_id = self.store.department_for_project(project_id)?;
        Ok(ResourceScope::project(project_id.clone(), department_id))
    }

    fn authorize(
        &self,
        actor_id: &UserId,
        action: Action,
        scope: &ResourceScope,
    ) -> Result<Principal, WorkflowError> {
        let principal = self.principal(actor_id)?;
        match self.capabilities.evaluate(&principal, action, scope) {
            Access::Allow => Ok(principal),
            Access::Deny(reason) => {
                debug!(user = %actor_id, %action, ?reason, "action denied");
                Err(WorkflowError::Forbidden {
                    user_id: actor_id.clone(),
                    action,
                    reason,
                })
            }
        }
    }

    fn authorize_requester(&self, actor_id: &UserId, job: &Job) -> Result<Principal, WorkflowError> {
        let scope = self
            .project_scope(&job.project_id)?
            .with_requester(job.requester_id.clone());
        self.authorize(actor_id, Action::ReviseJob, &scope)
    }

    fn authorize_assignee(&self, actor_id: &UserId, job: &Job) -> Result<Principal, WorkflowError> {
        let scope = self
            .project_scope(&job.project_id)?
            .with_assignee(job.assignee_id.clone());
        self.authorize(actor_id, Action::WorkOnJob, &scope)
    }

    fn dispatch_assigned(&self, job: &Job, assignment: &Assignment) {
        self.dispatch(
            NotificationEvent::new(NotificationEventType::JobAssigned, job.id.clone())
                .with("assignee_id", &assignment.assignee_id)
                .with("source", format!("{:?}", assignment.source))
                .with("due_date", job.due_date),
        );
    }

    fn dispatch(&self, event: NotificationEvent) {
        let event_type = event.event_type;
        let job_id = event.job_id.clone();
        if let Err(err) = self.notifier.notify(event) {
            warn!(job = %job_id, event = %event_type, error = %err, "notification not delivered");
        }
    }
}

fn transition(job: &mut Job, next: JobStatus) -> Result<(), WorkflowError> {
    if !job.status.can_transition_to(next) {
        return Err(WorkflowError::InvalidTransition {
            job_id: job.id.clone(),
            from: job.status,
            to: next,
        });
    }
    job.status = next;
    Ok(())
}

/// Error raised by the job service.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("{user_id} is not allowed to {action}")]
    Forbidden {
        user_id: UserId,
        action: Action,
        reason: DenyReason,
    },
    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("no due date can be derived from submission date {submitted_on}")]
    DueDateOutOfRange { submitted_on: NaiveDate },
}

impl WorkflowError {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Configuration(_) => "configuration",
            WorkflowError::Routing(_) => "routing",
            WorkflowError::Approval(_) => "approval",
            WorkflowError::Repository(_) => "persistence",
            WorkflowError::Forbidden { .. } => "forbidden",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::DueDateOutOfRange { .. } => "invalid_due_date",
        }
    }
}

impl From<AssignmentError> for WorkflowError {
    fn from(value: AssignmentError) -> Self {
        match value {
            AssignmentError::Configuration(err) => Self::Configuration(err),
            AssignmentError::Directory(err) => Self::Repository(err),
        }
    }
}
